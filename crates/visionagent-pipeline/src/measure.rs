//! Measurement module - largest lesion diameter in centimetres (RECIST-style)

use crate::config::PipelineConfig;
use ndarray::Array2;
use std::collections::VecDeque;
use visionagent_core::{Error, LesionMeasurement, Result, SegmentationMask, LOCATION_UNAVAILABLE};

const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone)]
pub struct LesionMeter {
    threshold: f32,
    pixel_spacing_cm: f64,
}

impl LesionMeter {
    pub fn new(threshold: f32, pixel_spacing_cm: f64) -> Result<Self> {
        if !(pixel_spacing_cm.is_finite() && pixel_spacing_cm > 0.0) {
            return Err(Error::config(format!(
                "pixel_spacing_cm must be positive, got {}",
                pixel_spacing_cm
            )));
        }
        Ok(Self {
            threshold,
            pixel_spacing_cm,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.mask_threshold, config.pixel_spacing()?)
    }

    /// Binarize, keep the largest 8-connected region (first in row-major scan
    /// order on ties) and report its maximum diameter.
    pub fn measure(&self, mask: &SegmentationMask) -> Result<LesionMeasurement> {
        let binary = mask.binarize(self.threshold);
        let region = largest_region(&binary).ok_or(Error::NoLesionFound)?;
        let diameter_px = max_diameter(&binary, &region);

        let (h, w) = binary.dim();
        let n = region.len() as f64;
        let mean_r = region.iter().map(|&(r, _)| r as f64).sum::<f64>() / n;
        let mean_c = region.iter().map(|&(_, c)| c as f64).sum::<f64>() / n;

        Ok(LesionMeasurement {
            area_px: region.len(),
            diameter_px,
            diameter_cm: diameter_px * self.pixel_spacing_cm,
            centroid: ((mean_r + 0.5) / h as f64, (mean_c + 0.5) / w as f64),
        })
    }
}

/// Pixels of the largest connected foreground region.
fn largest_region(binary: &Array2<bool>) -> Option<Vec<(usize, usize)>> {
    let (h, w) = binary.dim();
    let mut visited = Array2::from_elem((h, w), false);
    let mut best: Option<Vec<(usize, usize)>> = None;

    for r in 0..h {
        for c in 0..w {
            if !binary[[r, c]] || visited[[r, c]] {
                continue;
            }
            let mut region = Vec::new();
            let mut queue = VecDeque::from([(r, c)]);
            visited[[r, c]] = true;
            while let Some((y, x)) = queue.pop_front() {
                region.push((y, x));
                for (dy, dx) in NEIGHBORS {
                    let ny = y as isize + dy;
                    let nx = x as isize + dx;
                    if ny < 0 || nx < 0 || ny >= h as isize || nx >= w as isize {
                        continue;
                    }
                    let (ny, nx) = (ny as usize, nx as usize);
                    if binary[[ny, nx]] && !visited[[ny, nx]] {
                        visited[[ny, nx]] = true;
                        queue.push_back((ny, nx));
                    }
                }
            }
            if best.as_ref().map_or(true, |b| region.len() > b.len()) {
                best = Some(region);
            }
        }
    }
    best
}

/// Longest center-to-center distance between boundary pixels, plus one pixel
/// of extent so a single pixel measures 1.
fn max_diameter(binary: &Array2<bool>, region: &[(usize, usize)]) -> f64 {
    let (h, w) = binary.dim();
    let boundary: Vec<(usize, usize)> = region
        .iter()
        .copied()
        .filter(|&(r, c)| {
            r == 0
                || c == 0
                || r + 1 == h
                || c + 1 == w
                || !binary[[r - 1, c]]
                || !binary[[r + 1, c]]
                || !binary[[r, c - 1]]
                || !binary[[r, c + 1]]
        })
        .collect();

    let mut longest_sq = 0.0f64;
    for (i, &(r1, c1)) in boundary.iter().enumerate() {
        for &(r2, c2) in &boundary[i + 1..] {
            let dy = r1 as f64 - r2 as f64;
            let dx = c1 as f64 - c2 as f64;
            longest_sq = longest_sq.max(dy * dy + dx * dx);
        }
    }
    longest_sq.sqrt() + 1.0
}

/// Coarse lesion position on the image grid.
pub fn describe_location(measurement: Option<&LesionMeasurement>) -> String {
    let Some(m) = measurement else {
        return LOCATION_UNAVAILABLE.to_string();
    };
    let (y, x) = m.centroid;
    let vertical = if y < 1.0 / 3.0 {
        Some("Superior")
    } else if y > 2.0 / 3.0 {
        Some("Inferior")
    } else {
        None
    };
    let horizontal = if x < 1.0 / 3.0 {
        Some("Left")
    } else if x > 2.0 / 3.0 {
        Some("Right")
    } else {
        None
    };
    let region = match (horizontal, vertical) {
        (None, None) => "Central".to_string(),
        (Some(hz), None) => hz.to_string(),
        (None, Some(vt)) => vt.to_string(),
        (Some(hz), Some(vt)) => format!("{} {}", hz, vt),
    };
    format!("{} Region (Approximated)", region)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(rows: &[&str]) -> SegmentationMask {
        let h = rows.len();
        let w = rows[0].len();
        let data = rows
            .iter()
            .flat_map(|row| row.chars().map(|ch| if ch == '#' { 1.0 } else { 0.0 }))
            .collect();
        SegmentationMask::new(Array2::from_shape_vec((h, w), data).unwrap()).unwrap()
    }

    #[test]
    fn empty_mask_has_no_lesion() {
        let meter = LesionMeter::new(0.5, 0.1).unwrap();
        let err = meter.measure(&mask(&["....", "...."])).unwrap_err();
        assert!(matches!(err, Error::NoLesionFound));
    }

    #[test]
    fn horizontal_run_measures_its_length() {
        let meter = LesionMeter::new(0.5, 0.1).unwrap();
        let m = meter.measure(&mask(&["......", ".####.", "......"])).unwrap();
        assert_eq!(m.area_px, 4);
        assert!((m.diameter_px - 4.0).abs() < 1e-12);
        assert!((m.diameter_cm - 0.4).abs() < 1e-12);
    }

    #[test]
    fn single_pixel_measures_one() {
        let meter = LesionMeter::new(0.5, 0.25).unwrap();
        let m = meter.measure(&mask(&["...", ".#.", "..."])).unwrap();
        assert_eq!(m.diameter_px, 1.0);
        assert_eq!(m.diameter_cm, 0.25);
        assert_eq!(m.centroid, (0.5, 0.5));
    }

    #[test]
    fn picks_largest_region() {
        let meter = LesionMeter::new(0.5, 1.0).unwrap();
        let m = meter
            .measure(&mask(&["#.......", "........", "....###.", "....###."]))
            .unwrap();
        assert_eq!(m.area_px, 6);
    }

    #[test]
    fn ties_keep_first_in_scan_order() {
        let meter = LesionMeter::new(0.5, 1.0).unwrap();
        let m = meter.measure(&mask(&["##....", "......", "....##"])).unwrap();
        assert_eq!(m.area_px, 2);
        assert!(m.centroid.0 < 0.5, "expected the top region, got {:?}", m.centroid);
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let meter = LesionMeter::new(0.5, 1.0).unwrap();
        let m = meter.measure(&mask(&["#..", ".#.", "..#"])).unwrap();
        assert_eq!(m.area_px, 3);
        assert!((m.diameter_px - (8.0f64.sqrt() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn measurement_is_idempotent() {
        let meter = LesionMeter::new(0.5, 0.07).unwrap();
        let m = mask(&[".##..", "####.", ".##.."]);
        assert_eq!(meter.measure(&m).unwrap(), meter.measure(&m).unwrap());
    }

    #[test]
    fn rejects_missing_spacing() {
        assert!(LesionMeter::new(0.5, 0.0).is_err());
        assert!(LesionMeter::from_config(&PipelineConfig::default()).is_err());
    }

    #[test]
    fn location_names_quadrants() {
        let at = |y, x| LesionMeasurement {
            area_px: 1,
            diameter_px: 1.0,
            diameter_cm: 0.1,
            centroid: (y, x),
        };
        assert_eq!(
            describe_location(Some(&at(0.1, 0.1))),
            "Left Superior Region (Approximated)"
        );
        assert_eq!(
            describe_location(Some(&at(0.5, 0.5))),
            "Central Region (Approximated)"
        );
        assert_eq!(
            describe_location(Some(&at(0.9, 0.5))),
            "Inferior Region (Approximated)"
        );
        assert_eq!(describe_location(None), "N/A");
    }
}
