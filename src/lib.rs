//! visionagent - 2.5D brain-tumor MRI vision agent
//!
//! The binary wires the pipeline crates to a volume file on disk. This crate
//! holds the pieces the binary and its tests share.

pub mod volume;

pub use volume::VolumeFile;
