//! The externally visible diagnostic payload consumed by downstream agents

use crate::types::{Diagnosis, StabilityVerdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const AGENT_ID: &str = "vision_expert_01";
pub const AGENT_TYPE: &str = "2.5D_Attention_UNet";

/// Sentinel for `tumor_location` when no lesion was measured.
pub const LOCATION_UNAVAILABLE: &str = "N/A";

/// One diagnosis as handed to the orchestrator. Key names are a contract
/// with the Validation Agent and Report Generator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticPayload {
    pub agent_id: String,
    pub agent_type: String,
    pub timestamp: DateTime<Utc>,
    pub diagnosis: Diagnosis,
    pub confidence_score: f64,
    pub stability_check: StabilityVerdict,
    pub stability_score: f64,
    pub tumor_size_cm: f64,
    pub tumor_location: String,
    /// Empty when the explanation could not be produced.
    pub explanation_path: String,
    pub model_version: String,
}

impl DiagnosticPayload {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn has_explanation(&self) -> bool {
        !self.explanation_path.is_empty()
    }
}

/// Degraded-path notices, reported beside the payload rather than inside it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineWarning {
    ExplanationUnavailable(String),
    /// Positive diagnosis but the mask holds no lesion; size reported as 0.0.
    NoLesionForPositiveDiagnosis,
    /// TTA ran with fewer than two variants; stability is not meaningful.
    DegenerateTta,
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExplanationUnavailable(reason) => {
                write!(f, "explanation unavailable: {}", reason)
            }
            Self::NoLesionForPositiveDiagnosis => {
                f.write_str("tumor detected but segmentation found no lesion")
            }
            Self::DegenerateTta => f.write_str("stability computed from a single variant"),
        }
    }
}

/// Result of one successful pipeline call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisOutcome {
    pub payload: DiagnosticPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PipelineWarning>,
}

impl DiagnosisOutcome {
    pub fn has_warning(&self, warning: &PipelineWarning) -> bool {
        self.warnings.contains(warning)
    }
}
