//! Dual-stream inference engine

use crate::capability::{Classifier, ModelInfo, Segmenter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use visionagent_core::{ClassificationResult, Error, Result, SegmentationMask, VolumetricInput};

pub const SEGMENTATION_STREAM: &str = "segmentation";
pub const CLASSIFICATION_STREAM: &str = "classification";

/// Both stream outputs of one logical forward pass.
#[derive(Clone, Debug)]
pub struct DualStreamOutput {
    pub mask: SegmentationMask,
    pub classification: ClassificationResult,
}

/// Wraps the two model capabilities that share a windowed input.
///
/// The engine holds no mutable state, so one instance is shared across
/// concurrent calls behind an `Arc`.
pub struct DualStreamEngine {
    segmenter: Arc<dyn Segmenter>,
    classifier: Arc<dyn Classifier>,
    info: ModelInfo,
}

impl DualStreamEngine {
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        classifier: Arc<dyn Classifier>,
        info: ModelInfo,
    ) -> Self {
        Self {
            segmenter,
            classifier,
            info,
        }
    }

    /// Build from one model that implements both heads.
    pub fn from_model<M>(model: Arc<M>, info: ModelInfo) -> Self
    where
        M: Segmenter + Classifier + 'static,
    {
        Self {
            segmenter: model.clone(),
            classifier: model,
            info,
        }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn model_version(&self) -> &str {
        &self.info.version
    }

    pub fn architecture(&self) -> &str {
        &self.info.architecture
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn segmenter(&self) -> &Arc<dyn Segmenter> {
        &self.segmenter
    }

    pub async fn segment(
        &self,
        input: &VolumetricInput,
        timeout: Duration,
    ) -> Result<SegmentationMask> {
        let mask = with_timeout(
            SEGMENTATION_STREAM,
            timeout,
            self.segmenter.segment(input),
        )
        .await?;
        if mask.dims() != input.dims() {
            return Err(Error::inference(
                SEGMENTATION_STREAM,
                format!(
                    "{} returned a {}x{} mask for a {}x{} input",
                    self.segmenter.name(),
                    mask.dims().0,
                    mask.dims().1,
                    input.dims().0,
                    input.dims().1
                ),
            ));
        }
        Ok(mask)
    }

    pub async fn classify(
        &self,
        input: &VolumetricInput,
        timeout: Duration,
    ) -> Result<ClassificationResult> {
        classify_with_timeout(self.classifier.as_ref(), input, timeout).await
    }

    /// Run both streams on the same input. Either failure discards the other
    /// stream's output.
    pub async fn forward(
        &self,
        input: &VolumetricInput,
        timeout: Duration,
    ) -> Result<DualStreamOutput> {
        let (mask, classification) =
            tokio::try_join!(self.segment(input, timeout), self.classify(input, timeout))?;
        debug!(
            probability = classification.probability,
            "forward pass complete ({})",
            self.info.architecture
        );
        Ok(DualStreamOutput {
            mask,
            classification,
        })
    }
}

/// Invoke a classifier under a deadline. Shared by the engine and by TTA
/// workers that hold only the classifier handle.
pub async fn classify_with_timeout(
    classifier: &dyn Classifier,
    input: &VolumetricInput,
    timeout: Duration,
) -> Result<ClassificationResult> {
    with_timeout(CLASSIFICATION_STREAM, timeout, classifier.classify(input)).await
}

async fn with_timeout<T, F>(stream: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Error::Inference { message, .. })) => Err(Error::inference(stream, message)),
        Ok(Err(Error::InvalidInput(message))) => Err(Error::inference(stream, message)),
        Ok(Err(other)) => Err(other),
        Err(_) => Err(Error::timeout(stream, millis(timeout))),
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
