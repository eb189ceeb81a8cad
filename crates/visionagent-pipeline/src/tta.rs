//! TTA stability evaluator
//!
//! Re-runs the classification stream over the augmentation set and turns the
//! spread of the K probabilities into a pass/fail stability verdict.

use crate::augment::{self, Augmentation};
use crate::config::PipelineConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use visionagent_core::{Error, Result, StabilityReport, StabilityVerdict, VolumetricInput};
use visionagent_model::engine::{classify_with_timeout, CLASSIFICATION_STREAM};
use visionagent_model::Classifier;

/// Largest population variance a set of values in [0, 1] can have.
/// Variance is divided by this to get a unit-range instability.
pub const VARIANCE_CEILING: f64 = 0.25;

pub struct StabilityEvaluator {
    augmentations: Vec<Augmentation>,
    threshold: f64,
    max_workers: usize,
    timeout: Duration,
}

impl StabilityEvaluator {
    pub fn new(augmentations: Vec<Augmentation>, threshold: f64) -> Self {
        Self {
            augmentations,
            threshold,
            max_workers: 4,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let augmentations = augment::augmentation_set(config.tta_variant_count, config.tta_seed)?;
        Ok(Self::new(augmentations, config.stability_threshold)
            .with_workers(config.max_workers)
            .with_timeout(config.inference_timeout()))
    }

    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn augmentations(&self) -> &[Augmentation] {
        &self.augmentations
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify every variant, at most `max_workers` at a time, and aggregate
    /// in catalog order. Any variant failure fails the whole evaluation.
    /// Cancelling `cancel` aborts variants still in flight.
    pub async fn evaluate(
        &self,
        classifier: Arc<dyn Classifier>,
        input: &VolumetricInput,
        cancel: &CancellationToken,
    ) -> Result<StabilityReport> {
        let input = Arc::new(input.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for (index, augmentation) in self.augmentations.iter().cloned().enumerate() {
            let classifier = classifier.clone();
            let input = input.clone();
            let semaphore = semaphore.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Cancelled)?;
                let variant = augmentation.apply(&input)?;
                let result = classify_with_timeout(classifier.as_ref(), &variant, timeout).await?;
                debug!(
                    variant = %augmentation.name(),
                    probability = result.probability,
                    "tta variant scored"
                );
                Ok::<_, Error>((index, result.probability))
            });
        }

        let mut slots: Vec<Option<f64>> = vec![None; self.augmentations.len()];
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok((index, probability)))) => slots[index] = Some(probability),
                    Some(Ok(Err(e))) => return Err(e),
                    Some(Err(e)) => {
                        return Err(Error::inference(CLASSIFICATION_STREAM, e.to_string()))
                    }
                },
            }
        }

        let probabilities = slots
            .into_iter()
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| Error::inference(CLASSIFICATION_STREAM, "tta variant missing"))?;
        Ok(summarize(probabilities, self.threshold))
    }
}

/// Mean, population variance, score and verdict. Identical probabilities
/// (including a single one) give exactly the common mean and a variance of 0,
/// so they always pass.
pub fn summarize(probabilities: Vec<f64>, threshold: f64) -> StabilityReport {
    let (mean, variance) = match probabilities.split_first() {
        Some((&first, rest)) if rest.iter().all(|&p| p == first) => (first, 0.0),
        _ => {
            let k = probabilities.len().max(1) as f64;
            let mean = probabilities.iter().sum::<f64>() / k;
            let variance = probabilities
                .iter()
                .map(|p| (p - mean).powi(2))
                .sum::<f64>()
                / k;
            (mean, variance)
        }
    };
    let verdict = if variance <= threshold {
        StabilityVerdict::Passed
    } else {
        StabilityVerdict::Failed
    };
    StabilityReport {
        mean_probability: mean,
        variance,
        stability_score: stability_score(variance),
        verdict,
        probabilities,
    }
}

/// `1 - variance / VARIANCE_CEILING`, clamped to [0, 1].
pub fn stability_score(variance: f64) -> f64 {
    (1.0 - variance / VARIANCE_CEILING).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_variance_scores_one_and_passes() {
        let report = summarize(vec![0.7; 5], 0.01);
        assert_eq!(report.variance, 0.0);
        assert_eq!(report.stability_score, 1.0);
        assert_eq!(report.verdict, StabilityVerdict::Passed);
        assert!((report.mean_probability - 0.7).abs() < 1e-12);
    }

    #[test]
    fn identical_probabilities_are_exactly_stable() {
        for k in 2..=8 {
            for p in [0.7, 0.1, 0.92, 0.55] {
                let report = summarize(vec![p; k], 0.0);
                assert_eq!(report.variance, 0.0, "p={} k={}", p, k);
                assert_eq!(report.mean_probability, p);
                assert_eq!(report.stability_score, 1.0);
                assert_eq!(report.verdict, StabilityVerdict::Passed);
            }
        }
    }

    #[test]
    fn population_variance() {
        let report = summarize(vec![0.2, 0.4, 0.6, 0.8], 0.01);
        assert!((report.mean_probability - 0.5).abs() < 1e-12);
        assert!((report.variance - 0.05).abs() < 1e-12);
        assert!((report.stability_score - 0.8).abs() < 1e-12);
        assert_eq!(report.verdict, StabilityVerdict::Failed);
    }

    #[test]
    fn threshold_is_inclusive() {
        // variance of [0, 0.2] is exactly 0.01
        let report = summarize(vec![0.0, 0.2], 0.01 + 1e-15);
        assert_eq!(report.verdict, StabilityVerdict::Passed);
    }

    #[test]
    fn single_variant_is_degenerate_pass() {
        let report = summarize(vec![0.93], 0.0);
        assert_eq!(report.variance, 0.0);
        assert_eq!(report.verdict, StabilityVerdict::Passed);
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(stability_score(0.0), 1.0);
        assert_eq!(stability_score(0.25), 0.0);
        assert_eq!(stability_score(1.0), 0.0);
        assert!((stability_score(0.0047) - 0.9812).abs() < 1e-12);
    }
}
