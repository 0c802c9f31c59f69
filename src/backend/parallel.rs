//! Multithreaded backend distributing points over a `rayon` thread pool.

use super::NumericBackend;
use crate::{interpolation::Interpolator, num::CFloat, transformer::Transformer};
use ndarray::{prelude::*, Zip};

/// Backend processing points in parallel on the global `rayon` thread pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonBackend;

impl<F: CFloat> NumericBackend<F> for RayonBackend {
    const NAME: &'static str = "rayon";

    fn description(&self) -> String {
        format!(
            "{} ({} threads)",
            <Self as NumericBackend<F>>::NAME,
            rayon::current_num_threads()
        )
    }

    fn integrate_points(&self, transformer: &Transformer<F>, points: &mut Array2<F>) {
        Zip::from(points.rows_mut()).par_for_each(|point| transformer.integrate_row(point));
    }

    fn evaluate_velocities(&self, transformer: &Transformer<F>, points: &mut Array2<F>) {
        Zip::from(points.rows_mut()).par_for_each(|point| transformer.velocity_row(point));
    }

    fn resample<I: Interpolator>(
        &self,
        interpolator: &I,
        data: &ArrayViewD<F>,
        index_coords: ArrayView2<F>,
        values: &mut Array2<F>,
    ) {
        Zip::from(index_coords.rows())
            .and(values.rows_mut())
            .par_for_each(|coords, point_values| {
                let coords: Vec<F> = coords.to_vec();
                interpolator.interp_point(data, &coords, point_values);
            });
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{
        backend::NdarrayBackend, basis::Basis, config::CpabConfig,
        interpolation::linear::LinearInterpolator, tessellation::Tessellation,
        transformer::expand_theta,
    };

    #[test]
    fn parallel_integration_matches_sequential() {
        let config = CpabConfig::new(&[3, 3]);
        let tessellation = Tessellation::new(&config);
        let basis = Basis::build(&config, &tessellation).unwrap();
        let theta = Array1::from_shape_fn(basis.dim(), |idx| (idx as f64 * 0.37).sin());
        let affine = expand_theta(theta.view(), basis.basis(), config.affine_shape()).unwrap();
        let transformer = Transformer::new(&tessellation, affine, 50, false);

        let grid: Array2<f64> =
            NdarrayBackend.uniform_meshgrid(&[0.0, 0.0], &[1.0, 1.0], &[13, 11]);
        let mut sequential = grid.clone();
        let mut parallel = grid;
        NdarrayBackend.integrate_points(&transformer, &mut sequential);
        RayonBackend.integrate_points(&transformer, &mut parallel);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn parallel_resampling_matches_sequential() {
        let value = |(i, j, c): (usize, usize, usize)| ((i * 4 + j) as f32).sqrt() + c as f32;
        let data = Array3::from_shape_fn((5, 4, 2), value).into_dyn();
        let coords = Array2::from_shape_fn((17, 2), |(p, d)| (p * (d + 1)) as f32 * 0.23);
        let mut sequential = Array2::zeros((17, 2));
        let mut parallel = Array2::zeros((17, 2));
        NdarrayBackend.resample(&LinearInterpolator, &data.view(), coords.view(), &mut sequential);
        RayonBackend.resample(&LinearInterpolator, &data.view(), coords.view(), &mut parallel);
        assert_eq!(sequential, parallel);
    }
}
