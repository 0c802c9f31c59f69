//! Sequential backend built directly on `ndarray`.

use super::NumericBackend;
use crate::{interpolation::Interpolator, num::CFloat, transformer::Transformer};
use ndarray::prelude::*;

/// Backend processing one point after another on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct NdarrayBackend;

impl<F: CFloat> NumericBackend<F> for NdarrayBackend {
    const NAME: &'static str = "ndarray";

    fn integrate_points(&self, transformer: &Transformer<F>, points: &mut Array2<F>) {
        points
            .rows_mut()
            .into_iter()
            .for_each(|point| transformer.integrate_row(point));
    }

    fn evaluate_velocities(&self, transformer: &Transformer<F>, points: &mut Array2<F>) {
        points
            .rows_mut()
            .into_iter()
            .for_each(|point| transformer.velocity_row(point));
    }

    fn resample<I: Interpolator>(
        &self,
        interpolator: &I,
        data: &ArrayViewD<F>,
        index_coords: ArrayView2<F>,
        values: &mut Array2<F>,
    ) {
        for (coords, point_values) in index_coords.rows().into_iter().zip(values.rows_mut()) {
            let coords: Vec<F> = coords.to_vec();
            interpolator.interp_point(data, &coords, point_values);
        }
    }
}
