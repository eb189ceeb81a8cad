//! Core types for Visionagent

use crate::error::{Error, Result};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Probability at or above which the tumor class wins.
pub const TUMOR_THRESHOLD: f64 = 0.5;

/// Number of slices stacked into one 2.5D input (N-1, N, N+1).
pub const WINDOW_CHANNELS: usize = 3;

/// A single-channel 2D MRI slice, row-major `(height, width)`.
pub type Slice = Array2<f32>;

/// Three consecutive slices in temporal order (N-1, N, N+1).
#[derive(Clone, Debug)]
pub struct SliceTriple {
    slices: [Slice; WINDOW_CHANNELS],
}

impl SliceTriple {
    pub fn new(previous: Slice, center: Slice, next: Slice) -> Result<Self> {
        let dims = center.dim();
        if dims.0 == 0 || dims.1 == 0 {
            return Err(Error::invalid_input(format!(
                "center slice has empty dimensions {}x{}",
                dims.0, dims.1
            )));
        }
        for (label, slice) in [("previous", &previous), ("next", &next)] {
            if slice.dim() != dims {
                return Err(Error::invalid_input(format!(
                    "{} slice is {}x{}, center slice is {}x{}",
                    label,
                    slice.dim().0,
                    slice.dim().1,
                    dims.0,
                    dims.1
                )));
            }
        }
        Ok(Self {
            slices: [previous, center, next],
        })
    }

    pub fn center(&self) -> &Slice {
        &self.slices[1]
    }

    pub fn dims(&self) -> (usize, usize) {
        self.slices[1].dim()
    }

    pub fn slices(&self) -> &[Slice; WINDOW_CHANNELS] {
        &self.slices
    }
}

/// A 3-channel `(channel, height, width)` tensor fed to both model streams.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumetricInput {
    tensor: Array3<f32>,
}

impl VolumetricInput {
    pub fn new(tensor: Array3<f32>) -> Result<Self> {
        let (channels, height, width) = tensor.dim();
        if channels != WINDOW_CHANNELS {
            return Err(Error::invalid_input(format!(
                "volumetric input needs {} channels, got {}",
                WINDOW_CHANNELS, channels
            )));
        }
        if height == 0 || width == 0 {
            return Err(Error::invalid_input("volumetric input has no pixels"));
        }
        Ok(Self { tensor })
    }

    pub fn tensor(&self) -> &Array3<f32> {
        &self.tensor
    }

    pub fn into_tensor(self) -> Array3<f32> {
        self.tensor
    }

    pub fn channel(&self, index: usize) -> ArrayView2<'_, f32> {
        self.tensor.index_axis(Axis(0), index)
    }

    pub fn center(&self) -> ArrayView2<'_, f32> {
        self.channel(1)
    }

    /// Spatial size `(height, width)`.
    pub fn dims(&self) -> (usize, usize) {
        let (_, h, w) = self.tensor.dim();
        (h, w)
    }
}

/// Per-pixel lesion probability, same spatial size as the center slice.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationMask {
    probabilities: Array2<f32>,
}

impl SegmentationMask {
    pub fn new(probabilities: Array2<f32>) -> Result<Self> {
        if let Some(bad) = probabilities
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(Error::inference(
                "segmentation",
                format!("mask value {} outside [0, 1]", bad),
            ));
        }
        Ok(Self { probabilities })
    }

    pub fn probabilities(&self) -> &Array2<f32> {
        &self.probabilities
    }

    pub fn dims(&self) -> (usize, usize) {
        self.probabilities.dim()
    }

    pub fn binarize(&self, threshold: f32) -> Array2<bool> {
        self.probabilities.mapv(|p| p >= threshold)
    }
}

/// Intermediate feature maps of the classification stream and their
/// gradients with respect to the tumor score, both `(channel, h, w)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivationCapture {
    pub layer: String,
    activations: Array3<f32>,
    gradients: Array3<f32>,
}

impl ActivationCapture {
    pub fn new(
        layer: impl Into<String>,
        activations: Array3<f32>,
        gradients: Array3<f32>,
    ) -> Result<Self> {
        if activations.dim() != gradients.dim() {
            return Err(Error::inference(
                "classification",
                format!(
                    "activation shape {:?} does not match gradient shape {:?}",
                    activations.dim(),
                    gradients.dim()
                ),
            ));
        }
        Ok(Self {
            layer: layer.into(),
            activations,
            gradients,
        })
    }

    pub fn activations(&self) -> &Array3<f32> {
        &self.activations
    }

    pub fn gradients(&self) -> &Array3<f32> {
        &self.gradients
    }
}

/// Output of the classification stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    pub probability: f64,
    pub logit: f64,
    pub activations: Option<ActivationCapture>,
}

impl ClassificationResult {
    pub fn new(probability: f64, logit: f64) -> Result<Self> {
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(Error::inference(
                "classification",
                format!("probability {} outside [0, 1]", probability),
            ));
        }
        Ok(Self {
            probability,
            logit,
            activations: None,
        })
    }

    pub fn with_activations(mut self, capture: ActivationCapture) -> Self {
        self.activations = Some(capture);
        self
    }

    pub fn diagnosis(&self) -> Diagnosis {
        Diagnosis::from_probability(self.probability)
    }

    /// 1 for tumor, 0 for no tumor.
    pub fn predicted_class(&self) -> usize {
        match self.diagnosis() {
            Diagnosis::TumorDetected => 1,
            Diagnosis::NoTumorDetected => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Diagnosis {
    #[serde(rename = "Tumor Detected")]
    TumorDetected,
    #[serde(rename = "No Tumor Detected")]
    NoTumorDetected,
}

impl Diagnosis {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= TUMOR_THRESHOLD {
            Self::TumorDetected
        } else {
            Self::NoTumorDetected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TumorDetected => "Tumor Detected",
            Self::NoTumorDetected => "No Tumor Detected",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::TumorDetected)
    }
}

impl std::fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StabilityVerdict {
    Passed,
    Failed,
}

impl StabilityVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for StabilityVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate of the TTA classification runs. Immutable once computed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StabilityReport {
    pub mean_probability: f64,
    pub variance: f64,
    pub stability_score: f64,
    pub verdict: StabilityVerdict,
    /// Per-variant probabilities, in augmentation catalog order.
    pub probabilities: Vec<f64>,
}

/// Largest lesion measured from a segmentation mask.
#[derive(Clone, Debug, PartialEq)]
pub struct LesionMeasurement {
    pub area_px: usize,
    pub diameter_px: f64,
    pub diameter_cm: f64,
    /// Centroid as fractions of `(height, width)`, each in [0, 1].
    pub centroid: (f64, f64),
}
