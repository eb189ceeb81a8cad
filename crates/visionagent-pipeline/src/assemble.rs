//! Response assembler - maps stage outputs onto the payload fields

use crate::measure::describe_location;
use std::path::Path;
use visionagent_core::{
    ClassificationResult, DiagnosticPayload, LesionMeasurement, StabilityReport, AGENT_ID,
    AGENT_TYPE,
};

/// Everything a payload is built from. Absent measurement or explanation
/// map to the sentinel values `0.0` / `""`.
pub struct Assembly<'a> {
    pub classification: &'a ClassificationResult,
    pub stability: &'a StabilityReport,
    pub measurement: Option<&'a LesionMeasurement>,
    pub explanation_path: Option<&'a Path>,
    pub model_version: &'a str,
}

impl Assembly<'_> {
    pub fn into_payload(self) -> DiagnosticPayload {
        DiagnosticPayload {
            agent_id: AGENT_ID.to_string(),
            agent_type: AGENT_TYPE.to_string(),
            timestamp: chrono::Utc::now(),
            diagnosis: self.classification.diagnosis(),
            confidence_score: self.classification.probability,
            stability_check: self.stability.verdict,
            stability_score: self.stability.stability_score,
            tumor_size_cm: self.measurement.map_or(0.0, |m| m.diameter_cm),
            tumor_location: describe_location(self.measurement),
            explanation_path: self
                .explanation_path
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            model_version: self.model_version.to_string(),
        }
    }
}
