//! Multilinear interpolation.

use super::{clamp_index, Interpolator};
use crate::num::CFloat;
use ndarray::prelude::*;

/// Interpolator weighting the `2^ndim` data samples surrounding a coordinate
/// by their distance to it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearInterpolator;

impl Interpolator for LinearInterpolator {
    fn interp_point<F: CFloat>(
        &self,
        data: &ArrayViewD<F>,
        index_coords: &[F],
        mut values: ArrayViewMut1<F>,
    ) {
        let ndim = index_coords.len();
        let mut lower = [0; 3];
        let mut upper = [0; 3];
        let mut weights = [F::zero(); 3];

        for (dim, &coord) in index_coords.iter().enumerate() {
            let n_samples = data.shape()[dim];
            let coord = clamp_index(coord, n_samples);
            let floor = coord.floor();
            lower[dim] = floor.to_usize().unwrap_or(0).min(n_samples - 1);
            upper[dim] = (lower[dim] + 1).min(n_samples - 1);
            weights[dim] = coord - floor;
        }

        values.fill(F::zero());
        let mut index = [0; 4];
        for corner in 0..(1 << ndim) {
            let mut weight = F::one();
            for dim in 0..ndim {
                if corner & (1 << dim) != 0 {
                    index[dim] = upper[dim];
                    weight = weight * weights[dim];
                } else {
                    index[dim] = lower[dim];
                    weight = weight * (F::one() - weights[dim]);
                }
            }
            if weight == F::zero() {
                continue;
            }
            for (channel, value) in values.iter_mut().enumerate() {
                index[ndim] = channel;
                *value = *value + weight * data[&index[..=ndim]];
            }
        }
    }
}
