//! Test-time augmentation catalog
//!
//! A fixed, ordered list of named transforms. TTA takes the first K entries,
//! so the same K always means the same set. The only stochastic transform is
//! seeded from config.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use visionagent_core::{Error, Result, VolumetricInput};

pub const CATALOG_LEN: usize = 8;

const ROTATION_DEGREES: f32 = 10.0;
const BRIGHTNESS_DELTA: f32 = 0.05;
const NOISE_SIGMA: f32 = 0.01;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum Augmentation {
    Identity,
    HorizontalFlip,
    VerticalFlip,
    /// Counter-clockwise rotation about the image centre, bilinear, edge-clamped.
    Rotate { degrees: f32 },
    /// Additive intensity shift, clamped to [0, 1].
    Brightness { delta: f32 },
    GaussianNoise { sigma: f32, seed: u64 },
}

/// The canonical catalog, in TTA order.
pub fn catalog(seed: u64) -> [Augmentation; CATALOG_LEN] {
    [
        Augmentation::Identity,
        Augmentation::HorizontalFlip,
        Augmentation::Rotate {
            degrees: ROTATION_DEGREES,
        },
        Augmentation::Rotate {
            degrees: -ROTATION_DEGREES,
        },
        Augmentation::Brightness {
            delta: BRIGHTNESS_DELTA,
        },
        Augmentation::Brightness {
            delta: -BRIGHTNESS_DELTA,
        },
        Augmentation::VerticalFlip,
        Augmentation::GaussianNoise {
            sigma: NOISE_SIGMA,
            seed,
        },
    ]
}

/// First `count` catalog entries.
pub fn augmentation_set(count: usize, seed: u64) -> Result<Vec<Augmentation>> {
    if count == 0 || count > CATALOG_LEN {
        return Err(Error::config(format!(
            "augmentation count must be in 1..={}, got {}",
            CATALOG_LEN, count
        )));
    }
    Ok(catalog(seed).into_iter().take(count).collect())
}

impl Augmentation {
    pub fn name(&self) -> String {
        match self {
            Self::Identity => "identity".into(),
            Self::HorizontalFlip => "hflip".into(),
            Self::VerticalFlip => "vflip".into(),
            Self::Rotate { degrees } => format!("rotate({:+})", degrees),
            Self::Brightness { delta } => format!("brightness({:+})", delta),
            Self::GaussianNoise { sigma, seed } => format!("noise({}, seed={})", sigma, seed),
        }
    }

    /// Apply to every channel alike. Output shape always equals input shape.
    pub fn apply(&self, input: &VolumetricInput) -> Result<VolumetricInput> {
        let tensor = input.tensor();
        let out = match self {
            Self::Identity => tensor.clone(),
            Self::HorizontalFlip => tensor.slice(s![.., .., ..;-1]).to_owned(),
            Self::VerticalFlip => tensor.slice(s![.., ..;-1, ..]).to_owned(),
            Self::Rotate { degrees } => map_channels(tensor, |plane| rotate(plane, *degrees)),
            Self::Brightness { delta } => tensor.mapv(|v| (v + delta).clamp(0.0, 1.0)),
            Self::GaussianNoise { sigma, seed } => {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(*seed);
                let gaussian = StandardNormal;
                tensor.mapv(|v| {
                    let z: f32 = gaussian.sample(&mut rng);
                    (v + sigma * z).clamp(0.0, 1.0)
                })
            }
        };
        VolumetricInput::new(out)
    }
}

fn map_channels(tensor: &Array3<f32>, f: impl Fn(ArrayView2<'_, f32>) -> Array2<f32>) -> Array3<f32> {
    let mut out = Array3::zeros(tensor.dim());
    for (src, mut dst) in tensor.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        dst.assign(&f(src));
    }
    out
}

fn rotate(plane: ArrayView2<'_, f32>, degrees: f32) -> Array2<f32> {
    let (h, w) = plane.dim();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cy = (h as f32 - 1.0) / 2.0;
    let cx = (w as f32 - 1.0) / 2.0;
    Array2::from_shape_fn((h, w), |(r, c)| {
        let dy = r as f32 - cy;
        let dx = c as f32 - cx;
        // Inverse mapping: sample the source at the point that lands here.
        let sx = cx + dx * cos - dy * sin;
        let sy = cy + dx * sin + dy * cos;
        bilinear(&plane, sy, sx).clamp(0.0, 1.0)
    })
}

/// Bilinear sample with coordinates clamped to the image border.
pub(crate) fn bilinear(plane: &ArrayView2<'_, f32>, y: f32, x: f32) -> f32 {
    let (h, w) = plane.dim();
    let y = y.clamp(0.0, (h - 1) as f32);
    let x = x.clamp(0.0, (w - 1) as f32);
    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let fy = y - y0 as f32;
    let fx = x - x0 as f32;
    let top = plane[[y0, x0]] * (1.0 - fx) + plane[[y0, x1]] * fx;
    let bottom = plane[[y1, x0]] * (1.0 - fx) + plane[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
