//! Evaluation and integration of continuous piecewise-affine velocity fields.

use crate::{
    error::{CpabError, Result},
    num::{self, CFloat},
    tessellation::{CellQuery, Tessellation},
};
use ndarray::prelude::*;

/// Expands a parameter vector into the affine matrices of all cells.
///
/// # Parameters
///
/// - `theta`: Parameter vector of length `d`.
/// - `basis`: `[D, d]` basis matrix.
/// - `affine_shape`: Shape `[ndim, ndim + 1]` of a single affine matrix.
///
/// # Returns
///
/// A `[nC, ndim, ndim + 1]` array with the affine matrix of each cell.
pub fn expand_theta<F: CFloat>(
    theta: ArrayView1<F>,
    basis: ArrayView2<F>,
    affine_shape: [usize; 2],
) -> Result<Array3<F>> {
    if theta.len() != basis.ncols() {
        return Err(CpabError::shape_mismatch(
            "Length of theta",
            basis.ncols(),
            theta.len(),
        ));
    }
    let [n_rows, n_cols] = affine_shape;
    let params = basis.dot(&theta);
    let n_cells = params.len() / (n_rows * n_cols);
    Array3::from_shape_vec((n_cells, n_rows, n_cols), params.to_vec()).map_err(|err| {
        CpabError::Shape(format!(
            "Could not reshape {} affine parameters into {} cells: {}",
            params.len(),
            n_cells,
            err
        ))
    })
}

/// Checks that the given points have the expected dimensionality.
pub fn check_points<F: CFloat>(points: ArrayView2<F>, ndim: usize) -> Result<()> {
    if points.ncols() != ndim {
        Err(CpabError::shape_mismatch(
            "Dimensionality of points",
            ndim,
            points.ncols(),
        ))
    } else {
        Ok(())
    }
}

/// Integrator for the velocity field of a single parameter vector.
///
/// Velocities are integrated over unit time with a fixed number of forward
/// Euler steps, re-evaluating the containing cell before every step. Every
/// point is integrated independently of all others.
#[derive(Clone, Debug)]
pub struct Transformer<'a, F: CFloat> {
    tessellation: &'a Tessellation,
    affine: Array3<F>,
    n_steps: usize,
    valid_outside: bool,
}

impl<'a, F: CFloat> Transformer<'a, F> {
    /// Creates a new transformer.
    ///
    /// # Parameters
    ///
    /// - `tessellation`: Tessellation defining the cells.
    /// - `affine`: `[nC, ndim, ndim + 1]` affine matrices of the cells.
    /// - `n_steps`: Number of integration steps.
    /// - `valid_outside`: Whether the nearest cell's velocity applies outside the domain.
    ///
    /// # Panics
    ///
    /// If the shape of the affine matrices does not match the tessellation,
    /// or if the number of steps is zero.
    pub fn new(
        tessellation: &'a Tessellation,
        affine: Array3<F>,
        n_steps: usize,
        valid_outside: bool,
    ) -> Self {
        let ndim = tessellation.ndim();
        assert_eq!(
            affine.dim(),
            (tessellation.n_cells(), ndim, ndim + 1),
            "Affine matrices do not match tessellation"
        );
        assert_ne!(n_steps, 0, "Number of integration steps must be positive");
        Self {
            tessellation,
            affine,
            n_steps,
            valid_outside,
        }
    }

    /// Returns a view of the affine matrices of all cells.
    pub fn affine(&self) -> ArrayView3<'_, F> {
        self.affine.view()
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn valid_outside(&self) -> bool {
        self.valid_outside
    }

    /// Computes the velocity of the affine map of the given cell at the given point.
    pub fn cell_velocity(&self, cell: usize, point: &[F], velocity: &mut [F]) {
        let matrix = self.affine.index_axis(Axis(0), cell);
        let ndim = point.len();
        for (row, component) in velocity.iter_mut().enumerate() {
            let mut value = matrix[[row, ndim]];
            for dim in 0..ndim {
                value = value + matrix[[row, dim]] * point[dim];
            }
            *component = value;
        }
    }

    /// Computes the velocity at the given point.
    ///
    /// # Returns
    ///
    /// `false` if the point lies outside the domain where the velocity is
    /// zero, in which case `velocity` is set to zero.
    pub fn velocity_at(&self, point: &[F], velocity: &mut [F]) -> bool {
        match self.tessellation.find_cell(point) {
            CellQuery::Inside(cell) => {
                self.cell_velocity(cell, point, velocity);
                true
            }
            CellQuery::Outside(cell) if self.valid_outside => {
                self.cell_velocity(cell, point, velocity);
                true
            }
            CellQuery::Outside(_) => {
                velocity.fill(F::zero());
                false
            }
        }
    }

    /// Integrates the velocity field from the given point, overwriting it
    /// with the transformed position.
    ///
    /// A point that leaves the domain when velocities are not valid outside
    /// stays where it exited for the remaining steps.
    pub fn integrate_point(&self, point: &mut [F]) {
        let ndim = point.len();
        let step_length = F::one() / num::from_usize::<F>(self.n_steps);
        let mut velocity = [F::zero(); 3];

        for _ in 0..self.n_steps {
            if !self.velocity_at(point, &mut velocity[..ndim]) {
                break;
            }
            for dim in 0..ndim {
                point[dim] = point[dim] + step_length * velocity[dim];
            }
        }
    }

    /// Integrates the velocity field from the point stored in the given row.
    pub fn integrate_row(&self, mut row: ArrayViewMut1<F>) {
        let ndim = row.len();
        let mut point = [F::zero(); 3];
        for dim in 0..ndim {
            point[dim] = row[dim];
        }
        self.integrate_point(&mut point[..ndim]);
        for dim in 0..ndim {
            row[dim] = point[dim];
        }
    }

    /// Replaces the point stored in the given row with the velocity there.
    pub fn velocity_row(&self, mut row: ArrayViewMut1<F>) {
        let ndim = row.len();
        let mut point = [F::zero(); 3];
        let mut velocity = [F::zero(); 3];
        for dim in 0..ndim {
            point[dim] = row[dim];
        }
        self.velocity_at(&point[..ndim], &mut velocity[..ndim]);
        for dim in 0..ndim {
            row[dim] = velocity[dim];
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{basis::Basis, config::CpabConfig};
    use approx::assert_abs_diff_eq;

    fn setup(config: &CpabConfig) -> (Tessellation, Basis) {
        let tessellation = Tessellation::new(config);
        let basis = Basis::build(config, &tessellation).unwrap();
        (tessellation, basis)
    }

    #[test]
    fn theta_of_wrong_length_is_rejected() {
        let config = CpabConfig::new(&[3]);
        let (_, basis) = setup(&config);
        let theta = Array1::<f64>::zeros(basis.dim() + 1);
        let result = expand_theta(theta.view(), basis.basis(), config.affine_shape());
        assert!(matches!(result, Err(CpabError::Shape(_))));
    }

    #[test]
    fn expanded_theta_is_continuous_at_shared_vertices() {
        let config = CpabConfig::new(&[2, 2]).with_zero_boundary(false);
        let (tessellation, basis) = setup(&config);
        let theta = Array1::from_shape_fn(basis.dim(), |idx| ((idx * 7 % 5) as f64 - 2.0) * 0.3);
        let affine = expand_theta(theta.view(), basis.basis(), config.affine_shape()).unwrap();
        let transformer = Transformer::new(&tessellation, affine, 50, true);

        for facet in tessellation.shared_facets() {
            for &vertex_id in &facet.vertex_ids {
                let point = tessellation.vertex(vertex_id);
                let mut first = [0.0; 2];
                let mut second = [0.0; 2];
                transformer.cell_velocity(facet.cells[0], point, &mut first);
                transformer.cell_velocity(facet.cells[1], point, &mut second);
                assert_abs_diff_eq!(first[0], second[0], epsilon = 1e-10);
                assert_abs_diff_eq!(first[1], second[1], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn zero_boundary_velocity_vanishes_on_boundary() {
        let config = CpabConfig::new(&[3, 2]).with_zero_boundary(true);
        let (tessellation, basis) = setup(&config);
        let theta = Array1::from_elem(basis.dim(), 0.8);
        let affine = expand_theta(theta.view(), basis.basis(), config.affine_shape()).unwrap();
        let transformer = Transformer::new(&tessellation, affine, 50, false);

        let mut velocity = [0.0; 2];
        for point in [[0.0, 0.3], [1.0, 0.7], [0.4, 0.0], [0.9, 1.0]] {
            transformer.velocity_at(&point, &mut velocity);
            assert_abs_diff_eq!(velocity[0], 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(velocity[1], 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn constant_velocity_translates_points() {
        // A single unconstrained interval with zero slope and unit offset
        let config = CpabConfig::new(&[1])
            .with_zero_boundary(false)
            .with_integration_steps(10);
        let tessellation = Tessellation::new(&config);
        let affine = Array3::from_shape_vec((1, 1, 2), vec![0.0, 0.25]).unwrap();
        let transformer = Transformer::new(&tessellation, affine, 10, true);

        let mut point = [0.5];
        transformer.integrate_point(&mut point);
        assert_abs_diff_eq!(point[0], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn linear_velocity_matches_euler_scheme() {
        let n_steps = 50;
        let config = CpabConfig::new(&[1]).with_zero_boundary(false);
        let tessellation = Tessellation::new(&config);
        let affine = Array3::from_shape_vec((1, 1, 2), vec![0.5, 0.0]).unwrap();
        let transformer = Transformer::new(&tessellation, affine, n_steps, true);

        let mut point = [0.2];
        transformer.integrate_point(&mut point);
        let expected = 0.2 * (1.0 + 0.5 / n_steps as f64).powi(n_steps as i32);
        assert_abs_diff_eq!(point[0], expected, epsilon = 1e-12);
        // Close to the exact flow x exp(t/2)
        assert_abs_diff_eq!(point[0], 0.2 * 0.5f64.exp(), epsilon = 1e-3);
    }

    #[test]
    fn point_leaving_domain_stops_without_valid_outside() {
        let config = CpabConfig::new(&[1]).with_zero_boundary(false);
        let tessellation = Tessellation::new(&config);
        let affine = Array3::from_shape_vec((1, 1, 2), vec![0.0, 1.0]).unwrap();

        let stopping = Transformer::new(&tessellation, affine.clone(), 10, false);
        let mut point = [0.75];
        stopping.integrate_point(&mut point);
        // Three steps reach 1.05, after which the velocity is zero
        assert_abs_diff_eq!(point[0], 1.05, epsilon = 1e-12);

        let extrapolating = Transformer::new(&tessellation, affine, 10, true);
        let mut point = [0.75];
        extrapolating.integrate_point(&mut point);
        assert_abs_diff_eq!(point[0], 1.75, epsilon = 1e-12);
    }
}
