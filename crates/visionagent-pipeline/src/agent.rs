//! Vision agent runtime - one diagnosis call from slices to payload
//!
//! Windowing and the primary forward pass run first. TTA, attribution and
//! measurement then run concurrently off the same input. The explanation
//! artifact is written only once no fatal error remains, so an aborted call
//! leaves no files behind. Input and inference failures abort the call;
//! explanation and measurement failures degrade into sentinel payload values
//! plus a warning.

use crate::assemble::Assembly;
use crate::config::PipelineConfig;
use crate::explain::ExplainabilityGenerator;
use crate::measure::LesionMeter;
use crate::tta::StabilityEvaluator;
use crate::window::SliceWindower;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;
use visionagent_core::{DiagnosisOutcome, Error, PipelineWarning, Result, Slice};
use visionagent_model::{DualStreamEngine, ModelHost};

/// One slice of one study to diagnose.
#[derive(Clone, Debug)]
pub struct DiagnosisRequest {
    /// Study identifier, used to name the explanation artifact.
    pub case_id: String,
    /// The whole ordered slice stack, so neighbors can be windowed.
    pub slices: Vec<Slice>,
    /// Target slice N.
    pub index: usize,
}

impl DiagnosisRequest {
    pub fn new(case_id: impl Into<String>, slices: Vec<Slice>, index: usize) -> Self {
        Self {
            case_id: case_id.into(),
            slices,
            index,
        }
    }

    /// Filesystem-safe artifact name for this slice.
    pub fn artifact_stem(&self) -> String {
        let case: String = self
            .case_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let case = if case.is_empty() { "case".to_string() } else { case };
        format!("{}_slice{}", case, self.index)
    }
}

pub struct VisionAgent {
    engine: Arc<DualStreamEngine>,
    config: PipelineConfig,
    evaluator: StabilityEvaluator,
    meter: LesionMeter,
    explainer: ExplainabilityGenerator,
}

impl VisionAgent {
    pub fn new(engine: Arc<DualStreamEngine>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            evaluator: StabilityEvaluator::from_config(&config)?,
            meter: LesionMeter::from_config(&config)?,
            explainer: ExplainabilityGenerator::new(&config.explanation_output_dir),
            engine,
            config,
        })
    }

    /// Build against whatever engine the host currently holds.
    pub async fn from_host(host: &ModelHost, config: PipelineConfig) -> Result<Self> {
        Self::new(host.engine().await?, config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<DualStreamEngine> {
        &self.engine
    }

    /// Run a diagnosis without cancellation support.
    pub async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisOutcome> {
        self.diagnose_cancellable(request, CancellationToken::new())
            .await
    }

    /// Run a diagnosis with cancellation support.
    ///
    /// When `cancel` is triggered the call returns `Error::Cancelled` and
    /// in-flight TTA variants are aborted. No partial payload is produced.
    pub async fn diagnose_cancellable(
        &self,
        request: &DiagnosisRequest,
        cancel: CancellationToken,
    ) -> Result<DiagnosisOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "diagnose",
            %run_id,
            case = %request.case_id,
            slice = request.index
        );
        self.run(request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: &DiagnosisRequest,
        cancel: CancellationToken,
    ) -> Result<DiagnosisOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let input = SliceWindower::build(&request.slices, request.index)?;
        info!(dims = ?input.dims(), "volumetric input built");

        let timeout = self.config.inference_timeout();
        let forward = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            out = self.engine.forward(&input, timeout) => out?,
        };
        let classification = forward.classification;
        let diagnosis = classification.diagnosis();
        info!(
            probability = classification.probability,
            %diagnosis,
            "primary forward pass"
        );

        let stem = request.artifact_stem();
        let tta = self
            .evaluator
            .evaluate(self.engine.classifier().clone(), &input, &cancel);
        let attribute = async { self.explainer.attribute(&input, &classification) };
        let measure = async { self.meter.measure(&forward.mask) };
        let (stability, attribution, measurement) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            joined = async { tokio::join!(tta, attribute, measure) } => joined,
        };

        let stability = stability?;
        info!(
            mean = stability.mean_probability,
            variance = stability.variance,
            verdict = %stability.verdict,
            "stability evaluated"
        );

        let mut warnings = Vec::new();
        if self.evaluator.augmentations().len() < 2 {
            warnings.push(PipelineWarning::DegenerateTta);
        }

        let measurement = match measurement {
            Ok(m) => Some(m),
            Err(Error::NoLesionFound) if diagnosis.is_positive() => {
                if self.config.strict_measurement {
                    return Err(Error::NoLesionFound);
                }
                warn!("tumor detected but segmentation is empty; reporting size 0.0");
                warnings.push(PipelineWarning::NoLesionForPositiveDiagnosis);
                None
            }
            Err(Error::NoLesionFound) => None,
            Err(e) => return Err(e),
        };

        let explanation = match attribution {
            Ok(pending) => self.explainer.persist(pending, &stem).await,
            Err(e) => Err(e),
        };
        let explanation = match explanation {
            Ok(explanation) => Some(explanation),
            Err(e) if !e.is_fatal() => {
                warn!("explanation skipped: {}", e);
                warnings.push(PipelineWarning::ExplanationUnavailable(e.to_string()));
                None
            }
            Err(e) => return Err(e),
        };

        let payload = Assembly {
            classification: &classification,
            stability: &stability,
            measurement: measurement.as_ref(),
            explanation_path: explanation.as_ref().map(|e| e.path.as_path()),
            model_version: self.engine.model_version(),
        }
        .into_payload();

        info!(
            diagnosis = %payload.diagnosis,
            stability = %payload.stability_check,
            size_cm = payload.tumor_size_cm,
            warnings = warnings.len(),
            "diagnosis complete"
        );
        Ok(DiagnosisOutcome { payload, warnings })
    }
}
