//! Model capability traits
//!
//! A pre-trained dual-stream network is exposed as two independent
//! capabilities. One object may implement both (a shared encoder with two
//! heads), or each stream can be backed by a separate model.

use serde::{Deserialize, Serialize};
use visionagent_core::{ClassificationResult, Result, SegmentationMask, VolumetricInput};

/// Identity of the loaded weights, reported in every payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    /// Semantic version of the weights, e.g. "1.0.0".
    pub version: String,
    /// Architecture tag, e.g. "2.5D_Attention_UNet".
    pub architecture: String,
}

impl ModelInfo {
    pub fn new(version: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            architecture: architecture.into(),
        }
    }
}

/// Segmentation stream. Must return a mask with the input's spatial size.
#[async_trait::async_trait]
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    async fn segment(&self, input: &VolumetricInput) -> Result<SegmentationMask>;
}

/// Classification stream. Must be safe to invoke concurrently.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Whether results carry an activation capture for attribution.
    fn exposes_activations(&self) -> bool {
        true
    }

    async fn classify(&self, input: &VolumetricInput) -> Result<ClassificationResult>;
}
