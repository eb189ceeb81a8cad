//! Deterministic reference model
//!
//! A closed-form stand-in for the trained 2.5D attention U-Net. It fuses the
//! three slices with fixed channel weights, segments by a soft intensity
//! window, and scores the tumor class from the soft lesion fraction. All of
//! it is differentiable by hand, so the classifier can expose real
//! activations and gradients for attribution.

use crate::capability::{Classifier, ModelInfo, Segmenter};
use ndarray::{Array2, Array3, Axis, Zip};
use visionagent_core::{
    ActivationCapture, ClassificationResult, Result, SegmentationMask, VolumetricInput,
    AGENT_TYPE, WINDOW_CHANNELS,
};

pub const REFERENCE_MODEL_VERSION: &str = "1.0.0";

#[derive(Clone, Debug)]
pub struct ReferenceModelConfig {
    /// Fused intensity at which a pixel is half lesion.
    pub level: f32,
    /// Softness of the intensity window.
    pub width: f32,
    /// Weights for the N-1, N, N+1 channels.
    pub channel_weights: [f32; WINDOW_CHANNELS],
    /// Logit gain per unit of lesion fraction.
    pub gain: f64,
    /// Logit for an image with no lesion.
    pub bias: f64,
    pub capture_activations: bool,
}

impl Default for ReferenceModelConfig {
    fn default() -> Self {
        Self {
            level: 0.5,
            width: 0.05,
            channel_weights: [0.25, 0.5, 0.25],
            gain: 40.0,
            // logit(0.1)
            bias: -(9.0f64).ln(),
            capture_activations: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReferenceModel {
    config: ReferenceModelConfig,
}

impl ReferenceModel {
    pub fn new(config: ReferenceModelConfig) -> Self {
        Self { config }
    }

    pub fn info() -> ModelInfo {
        ModelInfo::new(REFERENCE_MODEL_VERSION, AGENT_TYPE)
    }

    pub fn config(&self) -> &ReferenceModelConfig {
        &self.config
    }

    fn fuse(&self, input: &VolumetricInput) -> Array2<f32> {
        let mut fused = Array2::zeros(input.dims());
        for (c, weight) in self.config.channel_weights.iter().enumerate() {
            fused.scaled_add(*weight, &input.channel(c));
        }
        fused
    }

    fn soft_mask(&self, fused: &Array2<f32>) -> Array2<f32> {
        let level = self.config.level;
        let width = self.config.width;
        fused.mapv(|v| sigmoid((v - level) / width))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[async_trait::async_trait]
impl Segmenter for ReferenceModel {
    fn name(&self) -> &str {
        "reference-segmenter"
    }

    async fn segment(&self, input: &VolumetricInput) -> Result<SegmentationMask> {
        let fused = self.fuse(input);
        SegmentationMask::new(self.soft_mask(&fused))
    }
}

#[async_trait::async_trait]
impl Classifier for ReferenceModel {
    fn name(&self) -> &str {
        "reference-classifier"
    }

    fn exposes_activations(&self) -> bool {
        self.config.capture_activations
    }

    async fn classify(&self, input: &VolumetricInput) -> Result<ClassificationResult> {
        let soft = self.soft_mask(&self.fuse(input));
        let pixels = soft.len() as f64;
        let fraction = soft.iter().map(|&v| v as f64).sum::<f64>() / pixels;
        let logit = self.config.gain * fraction + self.config.bias;
        let probability = 1.0 / (1.0 + (-logit).exp());
        let result = ClassificationResult::new(probability, logit)?;
        if !self.config.capture_activations {
            return Ok(result);
        }

        // d(logit)/d(x_c) = gain / pixels * s(1-s) / width * w_c
        let scale = (self.config.gain / pixels) as f32 / self.config.width;
        let slope = soft.mapv(|s| s * (1.0 - s) * scale);
        let mut gradients = Array3::zeros(input.tensor().dim());
        for (c, mut plane) in gradients.axis_iter_mut(Axis(0)).enumerate() {
            let weight = self.config.channel_weights[c];
            Zip::from(&mut plane)
                .and(&slope)
                .for_each(|g, &d| *g = d * weight);
        }
        let capture = ActivationCapture::new("input_fusion", input.tensor().clone(), gradients)?;
        Ok(result.with_activations(capture))
    }
}
