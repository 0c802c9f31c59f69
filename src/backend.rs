//! Numeric backends performing the array computations of a transformation.

#[cfg(feature = "parallel")]
pub mod parallel;
pub mod reference;

pub use reference::NdarrayBackend;

#[cfg(feature = "parallel")]
pub use parallel::RayonBackend;

use crate::{
    error::{CpabError, Result},
    interpolation::Interpolator,
    num::{self, CFloat},
    transformer::Transformer,
};
use nalgebra::{DMatrix, DVector};
use ndarray::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::fmt;

/// Defines the properties of a numeric backend.
///
/// The work that is independent for every point is delegated to
/// `integrate_points`, `evaluate_velocities` and `resample`. Everything else
/// has a shared default implementation.
pub trait NumericBackend<F: CFloat>: fmt::Debug + Default + Clone + Send + Sync {
    /// Name identifying the backend in messages.
    const NAME: &'static str;

    /// Whether the backend can run on a GPU.
    const SUPPORTS_GPU: bool = false;

    /// Returns a short description of the backend for status messages.
    fn description(&self) -> String {
        Self::NAME.to_string()
    }

    /// Creates a regular grid of points spanning the given box.
    ///
    /// # Returns
    ///
    /// A `[nP, ndim]` array where `nP` is the product of the point counts.
    /// The last dimension varies fastest.
    fn uniform_meshgrid(
        &self,
        domain_min: &[f64],
        domain_max: &[f64],
        point_counts: &[usize],
    ) -> Array2<F> {
        let ndim = point_counts.len();
        let n_points = point_counts.iter().product();
        let mut grid = Array2::zeros((n_points, ndim));

        for (point_idx, mut point) in grid.rows_mut().into_iter().enumerate() {
            let mut remainder = point_idx;
            for dim in (0..ndim).rev() {
                let count = point_counts[dim];
                let idx = remainder % count;
                remainder /= count;
                let coord = if count == 1 {
                    domain_min[dim]
                } else {
                    let extent = domain_max[dim] - domain_min[dim];
                    domain_min[dim] + extent * (idx as f64) / ((count - 1) as f64)
                };
                point[dim] = num::from_f64(coord);
            }
        }
        grid
    }

    /// Draws samples from a multivariate normal distribution.
    ///
    /// # Parameters
    ///
    /// - `rng`: Random number generator to draw from.
    /// - `mean`: Mean vector of length `d`.
    /// - `covariance`: `[d, d]` symmetric positive definite covariance matrix.
    /// - `n_samples`: Number of samples to draw.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains a `[n_samples, d]` array of samples.
    /// - `Err`: Contains an error if the shapes are inconsistent or the
    /// covariance is not positive definite.
    fn sample_gaussian<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        mean: ArrayView1<F>,
        covariance: ArrayView2<F>,
        n_samples: usize,
    ) -> Result<Array2<F>> {
        let dim = mean.len();
        if covariance.dim() != (dim, dim) {
            return Err(CpabError::Shape(format!(
                "Covariance of shape {:?} does not match mean of length {}",
                covariance.shape(),
                dim
            )));
        }
        let covariance = DMatrix::<f64>::from_fn(dim, dim, |i, j| covariance[[i, j]].into());
        let cholesky = covariance.cholesky().ok_or_else(|| {
            CpabError::InvalidArgument("Covariance matrix is not positive definite".to_string())
        })?;
        let lower = cholesky.l();

        let mut samples = Array2::zeros((n_samples, dim));
        for mut sample in samples.rows_mut() {
            let normal = DVector::<f64>::from_fn(dim, |_, _| StandardNormal.sample(rng));
            let correlated: DVector<f64> = &lower * normal;
            for (idx, value) in sample.iter_mut().enumerate() {
                *value = mean[idx] + num::from_f64(correlated[idx]);
            }
        }
        Ok(samples)
    }

    /// Creates parameter vectors with all entries equal to `epsilon`.
    fn zeros_like_theta(&self, dim: usize, n_samples: usize, epsilon: F) -> Array2<F> {
        Array2::from_elem((n_samples, dim), epsilon)
    }

    /// Computes the squared Euclidean distance between every pair of rows.
    fn pairwise_squared_distance(&self, points: ArrayView2<F>) -> Array2<F> {
        let norms = points.map_axis(Axis(1), |point| point.dot(&point));
        let gram = points.dot(&points.t());
        let two = F::one() + F::one();
        Array2::from_shape_fn(gram.dim(), |(i, j)| {
            (norms[i] - two * gram[[i, j]] + norms[j]).max(F::zero())
        })
    }

    /// Integrates the velocity field of the transformer from every row of
    /// `points`, overwriting them with the transformed positions.
    fn integrate_points(&self, transformer: &Transformer<F>, points: &mut Array2<F>);

    /// Replaces every row of `points` with the velocity there.
    fn evaluate_velocities(&self, transformer: &Transformer<F>, points: &mut Array2<F>);

    /// Interpolates the data at every row of `index_coords`, writing the
    /// channel values into the corresponding row of `values`.
    fn resample<I: Interpolator>(
        &self,
        interpolator: &I,
        data: &ArrayViewD<F>,
        index_coords: ArrayView2<F>,
        values: &mut Array2<F>,
    );
}
