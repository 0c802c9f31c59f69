//! High-level interface for sampling and applying CPAB transformations.

use crate::{
    backend::{NdarrayBackend, NumericBackend},
    basis::{registry::BasisRegistry, Basis},
    config::CpabConfig,
    error::{CpabError, Result},
    interpolation::{self, linear::LinearInterpolator, Interpolator},
    num::{self, CFloat},
    tessellation::Tessellation,
    transformer::{self, Transformer},
};
use ndarray::prelude::*;
use rand::Rng;
use std::sync::Arc;

/// Relative size of the diagonal jitter keeping the prior covariance positive definite.
const PRIOR_JITTER: f64 = 1e-6;

/// Derived quantities describing a transformation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpabParams {
    pub ndim: usize,
    pub tess_size: Vec<usize>,
    pub n_cells: usize,
    pub n_params: usize,
    pub theta_dim: usize,
    pub affine_shape: [usize; 2],
    pub n_integration_steps: usize,
    pub valid_outside: bool,
    pub zero_boundary: bool,
    pub volume_preserving: bool,
}

/// A family of continuous piecewise-affine based transformations.
///
/// Holds the tessellation and basis for a given configuration together with
/// the backend performing the numeric work.
///
/// # Type parameters
///
/// - `F`: Floating point type of points, parameters and data.
/// - `B`: Numeric backend.
#[derive(Clone, Debug)]
pub struct Cpab<F = f32, B = NdarrayBackend>
where
    F: CFloat,
    B: NumericBackend<F>,
{
    config: CpabConfig,
    tessellation: Tessellation,
    basis: Arc<Basis>,
    basis_matrix: Array2<F>,
    backend: B,
}

impl<F, B> Cpab<F, B>
where
    F: CFloat,
    B: NumericBackend<F>,
{
    /// Creates a new transformation family, obtaining the basis from the
    /// registry shared by the whole process.
    ///
    /// Families created with the same configuration therefore share one
    /// basis, which is only computed the first time.
    ///
    /// Note that some valid configurations leave no free parameters and are
    /// rejected with `CpabError::DegenerateConstraints`. With a zero boundary
    /// this includes every 3D tessellation with a single cell along some
    /// axis (such as `[1, 1, 1]` or `[3, 3, 1]`), since all of its vertices
    /// then lie on the boundary. Combining a zero boundary with volume
    /// preservation also leaves `[2, 2, 2]` and any 1D size without freedom.
    pub fn new(config: CpabConfig) -> Result<Self> {
        Self::with_registry(config, BasisRegistry::shared())
    }

    /// Creates a new transformation family, obtaining the basis from the
    /// given registry.
    pub fn with_registry(config: CpabConfig, registry: &BasisRegistry) -> Result<Self> {
        Self::with_backend(config, B::default(), registry)
    }

    /// Creates a new transformation family using the given backend instance.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the new transformation family.
    /// - `Err`: Contains an error if the configuration is invalid, cannot be
    /// used with the backend, or leaves no free parameters.
    pub fn with_backend(config: CpabConfig, backend: B, registry: &BasisRegistry) -> Result<Self> {
        config.validate_for_backend(B::NAME, B::SUPPORTS_GPU)?;
        let verbose = config.verbosity.print_messages();

        let tessellation = Tessellation::new(&config);
        if verbose {
            println!(
                "Created tessellation of {} cells over {:?} grid cells",
                tessellation.n_cells(),
                &config.tess_size
            );
        }
        let basis = registry.load_or_build(&config, &tessellation)?;
        let basis_matrix = basis.basis_as();
        if verbose {
            println!("Using {} backend on {}", backend.description(), config.device);
        }

        Ok(Self {
            config,
            tessellation,
            basis,
            basis_matrix,
            backend,
        })
    }

    pub fn config(&self) -> &CpabConfig {
        &self.config
    }

    pub fn tessellation(&self) -> &Tessellation {
        &self.tessellation
    }

    /// Returns the basis of the parameter space.
    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the number of free parameters `d`.
    pub fn theta_dimension(&self) -> usize {
        self.basis.dim()
    }

    /// Returns the derived quantities describing the transformation.
    pub fn params(&self) -> CpabParams {
        CpabParams {
            ndim: self.config.ndim(),
            tess_size: self.config.tess_size.clone(),
            n_cells: self.tessellation.n_cells(),
            n_params: self.basis.n_params(),
            theta_dim: self.basis.dim(),
            affine_shape: self.config.affine_shape(),
            n_integration_steps: self.config.n_integration_steps,
            valid_outside: self.config.valid_outside(),
            zero_boundary: self.config.zero_boundary,
            volume_preserving: self.config.volume_preserving,
        }
    }

    /// Draws random parameter vectors from a multivariate normal distribution.
    ///
    /// The mean defaults to zero and the covariance to the identity.
    pub fn sample_theta(
        &self,
        n_samples: usize,
        mean: Option<ArrayView1<F>>,
        covariance: Option<ArrayView2<F>>,
    ) -> Result<Array2<F>> {
        self.sample_theta_with_rng(&mut rand::thread_rng(), n_samples, mean, covariance)
    }

    /// Draws random parameter vectors using the given random number generator.
    pub fn sample_theta_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n_samples: usize,
        mean: Option<ArrayView1<F>>,
        covariance: Option<ArrayView2<F>>,
    ) -> Result<Array2<F>> {
        let dim = self.theta_dimension();
        let mean = match mean {
            Some(mean) if mean.len() != dim => {
                return Err(CpabError::shape_mismatch("Length of mean", dim, mean.len()))
            }
            Some(mean) => mean.to_owned(),
            None => Array1::zeros(dim),
        };
        let covariance = match covariance {
            Some(covariance) => covariance.to_owned(),
            None => Array2::eye(dim),
        };
        self.backend
            .sample_gaussian(rng, mean.view(), covariance.view(), n_samples)
    }

    /// Computes the covariance of the parameters under a smoothness prior.
    ///
    /// The affine parameters of different cells are correlated by a
    /// squared-exponential kernel of the distance between cell centers, with
    /// each affine component treated independently. The covariance is
    /// projected onto the parameter space through the basis.
    ///
    /// # Parameters
    ///
    /// - `length_scale`: Distance over which cells are strongly correlated.
    /// - `output_variance`: Variance of each affine parameter.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the `[d, d]` covariance matrix.
    /// - `Err`: Contains an error if a hyperparameter is not positive.
    pub fn prior_covariance(
        &self,
        length_scale: f64,
        output_variance: f64,
    ) -> Result<Array2<f64>> {
        if !(length_scale.is_finite() && length_scale > 0.0) {
            return Err(CpabError::InvalidArgument(format!(
                "Length scale must be positive, but got {}",
                length_scale
            )));
        }
        if !(output_variance.is_finite() && output_variance > 0.0) {
            return Err(CpabError::InvalidArgument(format!(
                "Output variance must be positive, but got {}",
                output_variance
            )));
        }

        let centers: Array2<F> = self.tessellation.cell_centers().mapv(num::from_f64);
        let kernel = self
            .backend
            .pairwise_squared_distance(centers.view())
            .mapv(|squared_distance| {
                let squared_distance: f64 = squared_distance.into();
                output_variance * (-0.5 * squared_distance / (length_scale * length_scale)).exp()
            });

        let basis = self.basis.basis();
        let params_per_cell = self.config.params_per_cell();
        let dim = self.theta_dimension();
        let mut covariance = Array2::zeros((dim, dim));
        for component in 0..params_per_cell {
            let component_rows = basis.slice(s![component..;params_per_cell, ..]);
            covariance += &component_rows.t().dot(&kernel.dot(&component_rows));
        }

        let jitter = PRIOR_JITTER * covariance.diag().fold(0.0, |max: f64, &v| max.max(v));
        covariance.diag_mut().mapv_inplace(|v| v + jitter);
        Ok(covariance)
    }

    /// Draws random parameter vectors from the smoothness prior.
    pub fn sample_theta_with_prior(
        &self,
        n_samples: usize,
        length_scale: f64,
        output_variance: f64,
    ) -> Result<Array2<F>> {
        self.sample_theta_with_prior_and_rng(
            &mut rand::thread_rng(),
            n_samples,
            length_scale,
            output_variance,
        )
    }

    /// Draws random parameter vectors from the smoothness prior using the
    /// given random number generator.
    pub fn sample_theta_with_prior_and_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n_samples: usize,
        length_scale: f64,
        output_variance: f64,
    ) -> Result<Array2<F>> {
        let covariance = self
            .prior_covariance(length_scale, output_variance)?
            .mapv(num::from_f64);
        let mean = Array1::zeros(self.theta_dimension());
        self.backend
            .sample_gaussian(rng, mean.view(), covariance.view(), n_samples)
    }

    /// Creates parameter vectors of the near-identity transformation.
    ///
    /// # Parameters
    ///
    /// - `n_samples`: Number of parameter vectors.
    /// - `epsilon`: Value of every parameter, where zero gives the exact identity.
    pub fn identity_theta(&self, n_samples: usize, epsilon: F) -> Result<Array2<F>> {
        if !(epsilon >= F::zero()) {
            return Err(CpabError::InvalidArgument(format!(
                "Identity epsilon must be non-negative, but got {:?}",
                epsilon
            )));
        }
        Ok(self
            .backend
            .zeros_like_theta(self.theta_dimension(), n_samples, epsilon))
    }

    /// Creates a regular grid of points spanning the domain.
    ///
    /// # Parameters
    ///
    /// - `point_counts`: Number of grid points along each dimension.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains a `[nP, ndim]` array of points where dimension 0
    /// varies slowest.
    /// - `Err`: Contains an error if the point counts do not match the
    /// dimensionality or any count is zero.
    pub fn uniform_meshgrid(&self, point_counts: &[usize]) -> Result<Array2<F>> {
        let ndim = self.config.ndim();
        if point_counts.len() != ndim {
            return Err(CpabError::shape_mismatch(
                "Number of grid dimensions",
                ndim,
                point_counts.len(),
            ));
        }
        if point_counts.contains(&0) {
            return Err(CpabError::InvalidArgument(format!(
                "Grid point counts must be positive, but got {:?}",
                point_counts
            )));
        }
        Ok(self.backend.uniform_meshgrid(
            &self.config.domain_min(),
            &self.config.domain_max(),
            point_counts,
        ))
    }

    /// Creates a transformer for the velocity field of the given parameters.
    pub fn transformer(&self, theta: ArrayView1<F>) -> Result<Transformer<'_, F>> {
        let affine_shape = self.config.affine_shape();
        let affine = transformer::expand_theta(theta, self.basis_matrix.view(), affine_shape)?;
        Ok(Transformer::new(
            &self.tessellation,
            affine,
            self.config.n_integration_steps,
            self.config.valid_outside(),
        ))
    }

    /// Transforms the given `[nP, ndim]` points with the given parameters.
    pub fn transform_points(
        &self,
        points: ArrayView2<F>,
        theta: ArrayView1<F>,
    ) -> Result<Array2<F>> {
        transformer::check_points(points, self.config.ndim())?;
        let transformer = self.transformer(theta)?;
        let mut transformed = points.to_owned();
        self.backend.integrate_points(&transformer, &mut transformed);
        Ok(transformed)
    }

    /// Transforms the given `[nP, ndim]` points with each of the given
    /// `[n, d]` parameter vectors.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains an `[n, nP, ndim]` array of transformed points.
    /// - `Err`: Contains an error if the shapes are inconsistent.
    pub fn transform_grid(
        &self,
        points: ArrayView2<F>,
        thetas: ArrayView2<F>,
    ) -> Result<Array3<F>> {
        transformer::check_points(points, self.config.ndim())?;
        self.check_thetas(thetas)?;

        let mut transformed = Array3::zeros((thetas.nrows(), points.nrows(), points.ncols()));
        for (theta, mut output) in thetas.rows().into_iter().zip(transformed.outer_iter_mut()) {
            output.assign(&self.transform_points(points, theta)?);
        }
        Ok(transformed)
    }

    /// Evaluates the velocity field of the given parameters at the given
    /// `[nP, ndim]` points.
    pub fn calc_velocity_field(
        &self,
        points: ArrayView2<F>,
        theta: ArrayView1<F>,
    ) -> Result<Array2<F>> {
        transformer::check_points(points, self.config.ndim())?;
        let transformer = self.transformer(theta)?;
        let mut velocities = points.to_owned();
        self.backend
            .evaluate_velocities(&transformer, &mut velocities);
        Ok(velocities)
    }

    /// Linearly interpolates the given data at the given points of the domain.
    pub fn interpolate(
        &self,
        data: ArrayViewD<F>,
        points: ArrayView2<F>,
        output_shape: &[usize],
    ) -> Result<ArrayD<F>> {
        self.interpolate_with(&LinearInterpolator, data, points, output_shape)
    }

    /// Interpolates the given data at the given points of the domain with
    /// the given interpolator.
    pub fn interpolate_with<I: Interpolator>(
        &self,
        interpolator: &I,
        data: ArrayViewD<F>,
        points: ArrayView2<F>,
        output_shape: &[usize],
    ) -> Result<ArrayD<F>> {
        interpolation::interpolate(
            &self.backend,
            interpolator,
            self.config.ndim(),
            data,
            points,
            output_shape,
        )
    }

    /// Deforms the given data with each of the given parameter vectors,
    /// using linear interpolation.
    pub fn transform_data(
        &self,
        data: ArrayViewD<F>,
        thetas: ArrayView2<F>,
        output_shape: &[usize],
    ) -> Result<ArrayD<F>> {
        self.transform_data_with(&LinearInterpolator, data, thetas, output_shape)
    }

    /// Deforms the given data with each of the given parameter vectors.
    ///
    /// A grid of `output_shape` points is transformed with every parameter
    /// vector and the data is sampled at the transformed points.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains an array with a leading axis over the parameter
    /// vectors, followed by `output_shape` and the channel axis if the data
    /// has one.
    /// - `Err`: Contains an error if the shapes are inconsistent.
    pub fn transform_data_with<I: Interpolator>(
        &self,
        interpolator: &I,
        data: ArrayViewD<F>,
        thetas: ArrayView2<F>,
        output_shape: &[usize],
    ) -> Result<ArrayD<F>> {
        if thetas.nrows() == 0 {
            return Err(CpabError::InvalidArgument(
                "At least one parameter vector is required".to_string(),
            ));
        }
        let grid = self.uniform_meshgrid(output_shape)?;
        let transformed = self.transform_grid(grid.view(), thetas)?;

        let samples = transformed
            .outer_iter()
            .map(|points| self.interpolate_with(interpolator, data.view(), points, output_shape))
            .collect::<Result<Vec<_>>>()?;
        let sample_views: Vec<_> = samples.iter().map(|sample| sample.view()).collect();
        ndarray::stack(Axis(0), &sample_views).map_err(|err| {
            CpabError::Shape(format!("Could not stack transformed data: {}", err))
        })
    }

    fn check_thetas(&self, thetas: ArrayView2<F>) -> Result<()> {
        if thetas.ncols() != self.theta_dimension() {
            Err(CpabError::shape_mismatch(
                "Length of theta",
                self.theta_dimension(),
                thetas.ncols(),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::config::Device;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn params_describe_configuration() {
        let cpab: Cpab<f64> = Cpab::new(CpabConfig::new(&[2]).with_zero_boundary(true)).unwrap();
        let params = cpab.params();
        assert_eq!(params.ndim, 1);
        assert_eq!(params.n_cells, 2);
        assert_eq!(params.n_params, 4);
        assert_eq!(params.theta_dim, 1);
        assert_eq!(params.affine_shape, [1, 2]);
        assert!(!params.valid_outside);
    }

    #[test]
    fn families_with_same_configuration_share_basis() {
        let config = CpabConfig::new(&[3, 2]).with_zero_boundary(false);
        let first: Cpab<f64> = Cpab::new(config.clone()).unwrap();
        let second: Cpab<f64> = Cpab::new(config.clone().with_integration_steps(10)).unwrap();
        assert!(std::ptr::eq(first.basis(), second.basis()));
        assert!(BasisRegistry::shared().contains(&config.fingerprint()));

        // The step count belongs to each family, not to the shared basis
        assert_eq!(first.params().n_integration_steps, 50);
        assert_eq!(second.params().n_integration_steps, 10);
    }

    #[test]
    fn gpu_device_is_rejected() {
        let config = CpabConfig::new(&[2, 2]).with_device(Device::Gpu);
        let result: Result<Cpab> = Cpab::new(config);
        assert!(matches!(result, Err(CpabError::Configuration(_))));
    }

    #[test]
    fn negative_identity_epsilon_is_rejected() {
        let cpab: Cpab = Cpab::new(CpabConfig::new(&[3])).unwrap();
        assert!(matches!(
            cpab.identity_theta(2, -1e-3),
            Err(CpabError::InvalidArgument(_))
        ));
        let theta = cpab.identity_theta(2, 1e-3).unwrap();
        assert_eq!(theta.dim(), (2, cpab.theta_dimension()));
    }

    #[test]
    fn meshgrid_requires_matching_dimensions() {
        let cpab: Cpab = Cpab::new(CpabConfig::new(&[2, 2])).unwrap();
        assert!(matches!(
            cpab.uniform_meshgrid(&[4]),
            Err(CpabError::Shape(_))
        ));
        assert!(matches!(
            cpab.uniform_meshgrid(&[4, 0]),
            Err(CpabError::InvalidArgument(_))
        ));
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let cpab: Cpab<f64> = Cpab::new(CpabConfig::new(&[2, 2])).unwrap();
        let first = cpab
            .sample_theta_with_rng(&mut StdRng::seed_from_u64(7), 3, None, None)
            .unwrap();
        let second = cpab
            .sample_theta_with_rng(&mut StdRng::seed_from_u64(7), 3, None, None)
            .unwrap();
        assert_eq!(first.dim(), (3, cpab.theta_dimension()));
        assert_eq!(first, second);
    }

    #[test]
    fn mean_of_wrong_length_is_rejected() {
        let cpab: Cpab<f64> = Cpab::new(CpabConfig::new(&[4])).unwrap();
        let mean = Array1::zeros(cpab.theta_dimension() + 2);
        let result = cpab.sample_theta(1, Some(mean.view()), None);
        assert!(matches!(result, Err(CpabError::Shape(_))));
    }

    #[test]
    fn prior_covariance_is_symmetric_positive_definite() {
        let cpab: Cpab<f64> = Cpab::new(CpabConfig::new(&[3, 2])).unwrap();
        let covariance = cpab.prior_covariance(0.3, 2.0).unwrap();
        let dim = cpab.theta_dimension();
        assert_eq!(covariance.dim(), (dim, dim));
        for i in 0..dim {
            assert!(covariance[[i, i]] > 0.0);
            for j in 0..dim {
                assert_abs_diff_eq!(covariance[[i, j]], covariance[[j, i]], epsilon = 1e-10);
            }
        }
        let matrix = nalgebra::DMatrix::from_fn(dim, dim, |i, j| covariance[[i, j]]);
        assert!(matrix.cholesky().is_some());
    }

    #[test]
    fn prior_samples_have_expected_shape() {
        let cpab: Cpab = Cpab::new(CpabConfig::new(&[4])).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let samples = cpab
            .sample_theta_with_prior_and_rng(&mut rng, 5, 0.1, 1.0)
            .unwrap();
        assert_eq!(samples.dim(), (5, cpab.theta_dimension()));
        assert!(samples.iter().all(|value| value.is_finite()));
        assert!(matches!(
            cpab.sample_theta_with_prior(1, 0.0, 1.0),
            Err(CpabError::InvalidArgument(_))
        ));
    }

    #[test]
    fn theta_batch_of_wrong_width_is_rejected() {
        let cpab: Cpab<f64> = Cpab::new(CpabConfig::new(&[2, 2])).unwrap();
        let grid = cpab.uniform_meshgrid(&[3, 3]).unwrap();
        let thetas = Array2::zeros((2, cpab.theta_dimension() + 1));
        assert!(matches!(
            cpab.transform_grid(grid.view(), thetas.view()),
            Err(CpabError::Shape(_))
        ));
    }

    #[test]
    fn velocity_field_is_continuous_across_cells() {
        let cpab: Cpab<f64> = Cpab::new(CpabConfig::new(&[3])).unwrap();
        let theta = cpab
            .sample_theta_with_rng(&mut StdRng::seed_from_u64(11), 1, None, None)
            .unwrap();
        let boundary = 1.0 / 3.0;
        let points = array![[boundary - 1e-9], [boundary + 1e-9]];
        let velocities = cpab
            .calc_velocity_field(points.view(), theta.row(0))
            .unwrap();
        assert_abs_diff_eq!(velocities[[0, 0]], velocities[[1, 0]], epsilon = 1e-6);
    }
}
