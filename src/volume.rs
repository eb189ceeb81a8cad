//! Volume files - a study's ordered slice stack as JSON
//!
//! ```json
//! { "case_id": "BRATS_001", "slices": [[[0.0, 0.1], [0.2, 0.3]], ...] }
//! ```

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use visionagent_core::{Error, Result, Slice};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeFile {
    #[serde(default)]
    pub case_id: String,
    /// Slices in acquisition order, each as rows of pixel intensities.
    pub slices: Vec<Vec<Vec<f32>>>,
}

impl VolumeFile {
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        let mut volume = Self::from_json_str(&data)?;
        if volume.case_id.is_empty() {
            volume.case_id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(volume)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Convert to dense slices. Every slice must be rectangular and share
    /// the first slice's dimensions.
    pub fn to_slices(&self) -> Result<Vec<Slice>> {
        if self.slices.is_empty() {
            return Err(Error::invalid_input("volume contains no slices"));
        }
        let mut expected: Option<(usize, usize)> = None;
        self.slices
            .iter()
            .enumerate()
            .map(|(i, rows)| {
                let h = rows.len();
                let w = rows.first().map_or(0, Vec::len);
                if h == 0 || w == 0 {
                    return Err(Error::invalid_input(format!("slice {} is empty", i)));
                }
                if rows.iter().any(|row| row.len() != w) {
                    return Err(Error::invalid_input(format!("slice {} is ragged", i)));
                }
                match expected {
                    Some(dims) if dims != (h, w) => {
                        return Err(Error::invalid_input(format!(
                            "slice {} is {}x{}, expected {}x{}",
                            i, h, w, dims.0, dims.1
                        )))
                    }
                    None => expected = Some((h, w)),
                    _ => {}
                }
                let flat: Vec<f32> = rows.iter().flatten().copied().collect();
                Array2::from_shape_vec((h, w), flat)
                    .map_err(|e| Error::invalid_input(format!("slice {}: {}", i, e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_converts() {
        let v = VolumeFile::from_json_str(
            r#"{"case_id":"c1","slices":[[[0.0,1.0],[2.0,3.0]],[[4.0,5.0],[6.0,7.0]]]}"#,
        )
        .unwrap();
        let slices = v.to_slices().unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[1][[1, 0]], 6.0);
    }

    #[test]
    fn rejects_mismatched_slices() {
        let v = VolumeFile::from_json_str(r#"{"slices":[[[0.0,1.0]],[[0.0],[1.0]]]}"#).unwrap();
        assert!(matches!(v.to_slices(), Err(Error::InvalidInput(_))));
    }
}
