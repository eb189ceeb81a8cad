//! Pipeline configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup, falls
//! back to defaults if no config file exists. `pixel_spacing_cm` has no
//! default and must be supplied by the file or the caller.

use crate::augment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use visionagent_core::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Population variance at or below which TTA passes.
    pub stability_threshold: f64,
    /// Number of augmentations (K), taken from the front of the catalog.
    pub tta_variant_count: usize,
    /// Seed for the noise augmentation.
    pub tta_seed: u64,
    /// Physical size of one pixel edge. Required for measurement.
    pub pixel_spacing_cm: Option<f64>,
    /// Where Grad-CAM artifacts are written.
    pub explanation_output_dir: PathBuf,
    /// Mask probability at or above which a pixel is lesion.
    pub mask_threshold: f32,
    /// Deadline for each model invocation.
    pub inference_timeout_ms: u64,
    /// Max concurrent TTA classifications.
    pub max_workers: usize,
    /// Abort with `NoLesionFound` when a positive diagnosis has an empty mask,
    /// instead of reporting size 0.0 with a warning.
    pub strict_measurement: bool,
}

pub const DEFAULT_STABILITY_THRESHOLD: f64 = 0.01;
pub const DEFAULT_TTA_VARIANTS: usize = 5;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            tta_variant_count: DEFAULT_TTA_VARIANTS,
            tta_seed: 42,
            pixel_spacing_cm: None,
            explanation_output_dir: PathBuf::from("./outputs"),
            mask_threshold: 0.5,
            inference_timeout_ms: 30_000,
            max_workers: 4,
            strict_measurement: false,
        }
    }
}

impl PipelineConfig {
    /// Load config from a TOML file. A missing file yields defaults; a file
    /// that does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)
                    .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {} - using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn with_pixel_spacing(mut self, spacing_cm: f64) -> Self {
        self.pixel_spacing_cm = Some(spacing_cm);
        self
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    /// The configured pixel spacing, or a config error if absent or invalid.
    pub fn pixel_spacing(&self) -> Result<f64> {
        match self.pixel_spacing_cm {
            Some(s) if s.is_finite() && s > 0.0 => Ok(s),
            Some(s) => Err(Error::config(format!(
                "pixel_spacing_cm must be positive, got {}",
                s
            ))),
            None => Err(Error::config("pixel_spacing_cm is required")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pixel_spacing()?;
        if !self.stability_threshold.is_finite() || self.stability_threshold < 0.0 {
            return Err(Error::config(format!(
                "stability_threshold must be >= 0, got {}",
                self.stability_threshold
            )));
        }
        let catalog_len = augment::CATALOG_LEN;
        if self.tta_variant_count == 0 || self.tta_variant_count > catalog_len {
            return Err(Error::config(format!(
                "tta_variant_count must be in 1..={}, got {}",
                catalog_len, self.tta_variant_count
            )));
        }
        if self.tta_variant_count < 2 {
            tracing::warn!("tta_variant_count is 1; stability check is degenerate");
        }
        if !(self.mask_threshold > 0.0 && self.mask_threshold <= 1.0) {
            return Err(Error::config(format!(
                "mask_threshold must be in (0, 1], got {}",
                self.mask_threshold
            )));
        }
        if self.inference_timeout_ms == 0 {
            return Err(Error::config("inference_timeout_ms must be > 0"));
        }
        if self.max_workers == 0 {
            return Err(Error::config("max_workers must be > 0"));
        }
        Ok(())
    }
}
