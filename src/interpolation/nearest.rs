//! Nearest-neighbour interpolation.

use super::{clamp_index, Interpolator};
use crate::num::CFloat;
use ndarray::prelude::*;

/// Interpolator picking the value of the closest data sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearestInterpolator;

impl Interpolator for NearestInterpolator {
    fn interp_point<F: CFloat>(
        &self,
        data: &ArrayViewD<F>,
        index_coords: &[F],
        mut values: ArrayViewMut1<F>,
    ) {
        let ndim = index_coords.len();
        let mut index = [0; 4];
        for (dim, &coord) in index_coords.iter().enumerate() {
            let n_samples = data.shape()[dim];
            let rounded = clamp_index(coord, n_samples).round();
            index[dim] = rounded.to_usize().unwrap_or(0).min(n_samples - 1);
        }
        for (channel, value) in values.iter_mut().enumerate() {
            index[ndim] = channel;
            *value = data[&index[..=ndim]];
        }
    }
}
