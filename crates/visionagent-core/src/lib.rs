//! Visionagent Core - Slice/tensor types, the diagnostic payload, and error handling

pub mod error;
pub mod payload;
pub mod types;

pub use error::{Error, Result};
pub use payload::*;
pub use types::*;
