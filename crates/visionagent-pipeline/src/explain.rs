//! Explainability generator - Grad-CAM attribution and its artifact
//!
//! Explanation is best-effort: every failure here surfaces as
//! `ExplainabilityUnavailable` so the caller can still return a diagnosis.

use crate::augment::bilinear;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use visionagent_core::{
    ActivationCapture, ClassificationResult, Diagnosis, Error, Result, VolumetricInput,
};

pub const GRAD_CAM: &str = "grad-cam";

/// Weight of the heatmap when blended over the center slice.
const OVERLAY_ALPHA: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct GradCam {
    pub apply_relu: bool,
    pub epsilon: f32,
}

impl Default for GradCam {
    fn default() -> Self {
        Self {
            apply_relu: true,
            epsilon: 1e-6,
        }
    }
}

impl GradCam {
    /// Heatmap in [0, 1] for `target_class`, resampled to `dims`.
    ///
    /// Gradients in the capture are taken w.r.t. the tumor logit; class 0
    /// scores the negated logit, so its gradients flip sign.
    pub fn attribute(
        &self,
        capture: &ActivationCapture,
        target_class: usize,
        dims: (usize, usize),
    ) -> Result<Array2<f32>> {
        let activations = capture.activations();
        let gradients = capture.gradients();
        let (channels, h, w) = activations.dim();
        if channels == 0 || h == 0 || w == 0 {
            return Err(Error::explainability(format!(
                "layer {} captured an empty activation map",
                capture.layer
            )));
        }
        let sign = if target_class == 1 { 1.0 } else { -1.0 };

        let weights: Vec<f32> = gradients
            .axis_iter(Axis(0))
            .map(|g| sign * g.sum() / (h * w) as f32)
            .collect();

        let mut cam = Array2::<f32>::zeros((h, w));
        for (weight, activation) in weights.iter().zip(activations.axis_iter(Axis(0))) {
            cam.scaled_add(*weight, &activation);
        }
        if self.apply_relu {
            cam.mapv_inplace(|v| v.max(0.0));
        }
        normalise_unit_interval(&mut cam, self.epsilon);
        Ok(resample(&cam, dims))
    }
}

/// Min-max scale in place. A flat map becomes all zeros.
pub fn normalise_unit_interval(values: &mut Array2<f32>, epsilon: f32) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range < epsilon {
        values.fill(0.0);
    } else {
        values.mapv_inplace(|v| (v - min) / range);
    }
}

/// Bilinear resample with aligned corners.
pub fn resample(map: &Array2<f32>, dims: (usize, usize)) -> Array2<f32> {
    if map.dim() == dims {
        return map.clone();
    }
    let (h, w) = map.dim();
    let scale = |src: usize, dst: usize| {
        if dst > 1 {
            (src as f32 - 1.0) / (dst as f32 - 1.0)
        } else {
            0.0
        }
    };
    let sy = scale(h, dims.0);
    let sx = scale(w, dims.1);
    let view = map.view();
    Array2::from_shape_fn(dims, |(r, c)| bilinear(&view, r as f32 * sy, c as f32 * sx))
}

/// Serialized attribution artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionReport {
    pub algorithm: String,
    pub layer: String,
    pub target_class: usize,
    pub target_label: Diagnosis,
    pub probability: f64,
    pub rows: usize,
    pub cols: usize,
    pub heatmap: Vec<f32>,
    /// Heatmap blended over the center slice, same shape.
    pub overlay: Vec<f32>,
}

impl AttributionReport {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn from_json_str(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

/// Attribution computed in memory, not yet written.
#[derive(Debug, Clone)]
pub struct PendingExplanation {
    pub heatmap: Array2<f32>,
    pub report: AttributionReport,
}

#[derive(Debug, Clone)]
pub struct Explanation {
    pub heatmap: Array2<f32>,
    pub path: PathBuf,
}

pub struct ExplainabilityGenerator {
    output_dir: PathBuf,
    grad_cam: GradCam,
}

impl ExplainabilityGenerator {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            grad_cam: GradCam::default(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Compute the heatmap for the predicted class and write it to
    /// `<output_dir>/gradcam_<stem>.json`.
    pub async fn explain(
        &self,
        input: &VolumetricInput,
        classification: &ClassificationResult,
        stem: &str,
    ) -> Result<Explanation> {
        let pending = self.attribute(input, classification)?;
        self.persist(pending, stem).await
    }

    /// Heatmap and overlay for the predicted class. Touches no files.
    pub fn attribute(
        &self,
        input: &VolumetricInput,
        classification: &ClassificationResult,
    ) -> Result<PendingExplanation> {
        let capture = classification.activations.as_ref().ok_or_else(|| {
            Error::explainability("classifier did not expose intermediate activations")
        })?;
        let target_class = classification.predicted_class();
        let dims = input.dims();
        let heatmap = self.grad_cam.attribute(capture, target_class, dims)?;

        let center = input.center();
        let overlay = ndarray::Zip::from(&heatmap)
            .and(&center)
            .map_collect(|&heat, &pixel| (1.0 - OVERLAY_ALPHA) * pixel + OVERLAY_ALPHA * heat);

        let report = AttributionReport {
            algorithm: GRAD_CAM.into(),
            layer: capture.layer.clone(),
            target_class,
            target_label: classification.diagnosis(),
            probability: classification.probability,
            rows: dims.0,
            cols: dims.1,
            heatmap: heatmap.iter().copied().collect(),
            overlay: overlay.iter().copied().collect(),
        };
        Ok(PendingExplanation { heatmap, report })
    }

    /// Write a computed attribution to `<output_dir>/gradcam_<stem>.json`.
    pub async fn persist(&self, pending: PendingExplanation, stem: &str) -> Result<Explanation> {
        let path = self.output_dir.join(format!("gradcam_{}.json", stem));
        self.write_report(&pending.report, &path).await?;
        info!("explanation written to {}", path.display());
        Ok(Explanation {
            heatmap: pending.heatmap,
            path,
        })
    }

    async fn write_report(&self, report: &AttributionReport, path: &Path) -> Result<()> {
        let json = serde_json::to_string(report)
            .map_err(|e| Error::explainability(format!("cannot encode heatmap: {}", e)))?;
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                Error::explainability(format!(
                    "cannot create {}: {}",
                    self.output_dir.display(),
                    e
                ))
            })?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| Error::explainability(format!("cannot write {}: {}", path.display(), e)))?;
        debug!(bytes = report.heatmap.len(), "attribution persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn capture(activations: Vec<f32>, gradients: Vec<f32>, c: usize, h: usize, w: usize) -> ActivationCapture {
        ActivationCapture::new(
            "enc4",
            Array3::from_shape_vec((c, h, w), activations).unwrap(),
            Array3::from_shape_vec((c, h, w), gradients).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn grad_cam_normalises_heatmap() {
        let cap = capture(
            vec![
                1.0, 1.0, 1.0, 1.0, // channel 0
                0.5, 1.0, 1.5, 2.0, // channel 1
            ],
            vec![
                1.0, 1.0, 1.0, 1.0, // channel 0
                0.0, 0.0, 0.0, 0.4, // channel 1
            ],
            2,
            2,
            2,
        );
        let heatmap = GradCam::default().attribute(&cap, 1, (2, 2)).unwrap();
        let expected = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        for (value, expected) in heatmap.iter().zip(expected.iter()) {
            assert!((value - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn negative_class_flips_gradients() {
        let cap = capture(vec![0.0, 1.0], vec![-1.0, -1.0], 1, 1, 2);
        let positive = GradCam::default().attribute(&cap, 1, (1, 2)).unwrap();
        assert!(positive.iter().all(|v| *v == 0.0));
        let negative = GradCam::default().attribute(&cap, 0, (1, 2)).unwrap();
        assert_eq!(negative[[0, 1]], 1.0);
    }

    #[test]
    fn resample_preserves_corners() {
        let map = ndarray::arr2(&[[0.0f32, 1.0], [1.0, 0.0]]);
        let up = resample(&map, (5, 5));
        assert_eq!(up.dim(), (5, 5));
        assert_eq!(up[[0, 0]], 0.0);
        assert_eq!(up[[0, 4]], 1.0);
        assert_eq!(up[[4, 0]], 1.0);
        assert!((up[[2, 2]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn flat_map_normalises_to_zero() {
        let mut map = Array2::from_elem((3, 3), 0.4f32);
        normalise_unit_interval(&mut map, 1e-6);
        assert!(map.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn attribute_writes_nothing_until_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ExplainabilityGenerator::new(dir.path().join("cams"));
        let tensor = Array3::from_shape_fn((3, 2, 2), |(_, r, c)| (r * 2 + c) as f32 / 3.0);
        let input = VolumetricInput::new(tensor.clone()).unwrap();
        let classification = ClassificationResult::new(0.8, 1.4)
            .unwrap()
            .with_activations(
                ActivationCapture::new("enc4", tensor.clone(), Array3::ones((3, 2, 2))).unwrap(),
            );

        let pending = generator.attribute(&input, &classification).unwrap();
        assert_eq!(pending.report.shape(), (2, 2));
        assert_eq!(pending.report.target_class, 1);
        assert!(!generator.output_dir().exists());

        let explanation = generator.persist(pending, "case_slice0").await.unwrap();
        assert!(explanation.path.ends_with("gradcam_case_slice0.json"));
        assert!(explanation.path.exists());
    }
}
