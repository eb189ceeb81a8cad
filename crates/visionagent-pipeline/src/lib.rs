//! Visionagent Pipeline - 2.5D windowing, TTA stability, Grad-CAM, measurement
//!
//! `VisionAgent::diagnose` runs one call end to end. Each stage is also usable
//! on its own.

pub mod agent;
pub mod assemble;
pub mod augment;
pub mod config;
pub mod explain;
pub mod measure;
pub mod tta;
pub mod window;

pub use agent::{DiagnosisRequest, VisionAgent};
pub use augment::Augmentation;
pub use config::PipelineConfig;
pub use explain::{Explanation, GradCam, PendingExplanation};
pub use measure::LesionMeter;
pub use tta::StabilityEvaluator;
pub use window::SliceWindower;
