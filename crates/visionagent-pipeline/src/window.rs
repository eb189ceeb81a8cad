//! Slice windower - builds the 2.5D input from a slice and its neighbors

use ndarray::{stack, Axis};
use visionagent_core::{Error, Result, Slice, SliceTriple, VolumetricInput};

/// Intensity range below which a volume is treated as flat.
const FLAT_RANGE: f32 = 1e-6;

pub struct SliceWindower;

impl SliceWindower {
    /// Select slices N-1, N, N+1. Out-of-range neighbors replicate the
    /// nearest valid slice; a missing target slice is an error.
    pub fn window(slices: &[Slice], index: usize) -> Result<SliceTriple> {
        if index >= slices.len() {
            return Err(Error::invalid_input(format!(
                "slice {} requested from a volume of {} slices",
                index,
                slices.len()
            )));
        }
        let previous = index.saturating_sub(1);
        let next = (index + 1).min(slices.len() - 1);
        SliceTriple::new(
            slices[previous].clone(),
            slices[index].clone(),
            slices[next].clone(),
        )
    }

    /// Stack a triple along the channel axis and min-max normalize all three
    /// channels jointly to [0, 1]. A flat volume maps to all zeros.
    pub fn stack(triple: &SliceTriple) -> Result<VolumetricInput> {
        let [previous, center, next] = triple.slices();
        if triple
            .slices()
            .iter()
            .any(|s| s.iter().any(|v| !v.is_finite()))
        {
            return Err(Error::invalid_input("slice contains non-finite intensities"));
        }
        let mut tensor = stack(Axis(0), &[previous.view(), center.view(), next.view()])
            .map_err(|e| Error::invalid_input(format!("cannot stack slices: {}", e)))?;

        let (min, max) = tensor
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        if range < FLAT_RANGE {
            tensor.fill(0.0);
        } else {
            tensor.mapv_inplace(|v| (v - min) / range);
        }
        VolumetricInput::new(tensor)
    }

    pub fn build(slices: &[Slice], index: usize) -> Result<VolumetricInput> {
        let triple = Self::window(slices, index)?;
        Self::stack(&triple)
    }
}
