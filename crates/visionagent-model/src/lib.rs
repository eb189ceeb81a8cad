//! Visionagent Model - Segmentation/classification capabilities behind one engine

pub mod capability;
pub mod engine;
pub mod host;
pub mod reference;

pub use capability::{Classifier, ModelInfo, Segmenter};
pub use engine::{DualStreamEngine, DualStreamOutput};
pub use host::{EngineHandle, ModelHost};
pub use reference::{ReferenceModel, ReferenceModelConfig};
