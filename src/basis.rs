//! Null-space basis of the tessellation constraints.
//!
//! The basis maps a compact parameter vector to the flattened affine
//! parameters of all cells, such that every generated velocity field
//! satisfies the constraints of the tessellation.

pub mod registry;

use crate::{
    config::CpabConfig,
    error::{CpabError, Result},
    num::{self, CFloat, NULL_SPACE_TOLERANCE},
    tessellation::Tessellation,
};
use nalgebra::{DMatrix, SVD};
use ndarray::prelude::*;

#[cfg(feature = "persistence")]
use serde::{Deserialize, Serialize};

/// A basis for the space of constraint-satisfying affine parameters, together
/// with the quantities describing the configuration it was derived for.
///
/// Integration settings are not part of a basis, so one basis serves every
/// step count of the same tessellation and constraints.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
pub struct Basis {
    basis: Array2<f64>,
    constraints: Array2<f64>,
    ndim: usize,
    n_params: usize,
    dim: usize,
    cell_counts: Vec<usize>,
    n_cells: usize,
    affine_shape: [usize; 2],
}

impl Basis {
    /// Builds the constraint matrix of the given tessellation and computes
    /// the basis of its null space.
    pub fn build(config: &CpabConfig, tessellation: &Tessellation) -> Result<Self> {
        let constraints = tessellation.constraint_matrix();
        let basis = compute_null_space(constraints.view())?;
        let (n_params, dim) = basis.dim();
        Ok(Self {
            basis,
            constraints,
            ndim: config.ndim(),
            n_params,
            dim,
            cell_counts: config.tess_size.clone(),
            n_cells: tessellation.n_cells(),
            affine_shape: config.affine_shape(),
        })
    }

    /// Returns the `[D, d]` basis matrix with orthonormal columns.
    pub fn basis(&self) -> ArrayView2<'_, f64> {
        self.basis.view()
    }

    /// Returns the basis matrix converted to the given working precision.
    pub fn basis_as<F: CFloat>(&self) -> Array2<F> {
        self.basis.mapv(num::from_f64)
    }

    /// Returns the constraint matrix the basis was computed from.
    pub fn constraints(&self) -> ArrayView2<'_, f64> {
        self.constraints.view()
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Returns the number of flattened affine parameters `D`.
    pub fn n_params(&self) -> usize {
        self.n_params
    }

    /// Returns the dimension `d` of the parameter space.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn cell_counts(&self) -> &[usize] {
        &self.cell_counts
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn affine_shape(&self) -> [usize; 2] {
        self.affine_shape
    }

    /// Whether the basis was derived for a configuration equivalent to the given one.
    pub fn matches(&self, config: &CpabConfig) -> bool {
        self.ndim == config.ndim()
            && self.cell_counts == config.tess_size
            && self.n_params == config.n_affine_params()
            && self.n_cells == config.n_cells()
    }
}

/// Computes an orthonormal basis for the right null space of the given matrix.
///
/// The basis consists of the right singular vectors whose singular values are
/// below a small tolerance relative to the largest singular value. Each basis
/// vector is oriented so that its largest-magnitude component is positive.
///
/// # Returns
///
/// A `[n_cols, d]` matrix, or a `DegenerateConstraints` error if `d == 0`.
pub fn compute_null_space(matrix: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (n_rows, n_cols) = matrix.dim();
    if n_rows == 0 {
        return Ok(Array2::eye(n_cols));
    }

    // The thin SVD only yields min(rows, cols) right singular vectors, so
    // zero rows are appended until all of them are available.
    let padded_rows = usize::max(n_rows, n_cols);
    let padded = DMatrix::from_fn(padded_rows, n_cols, |row, col| {
        if row < n_rows {
            matrix[[row, col]]
        } else {
            0.0
        }
    });

    let svd = SVD::new(padded, false, true);
    let v_t = svd
        .v_t
        .as_ref()
        .expect("Right singular vectors were requested");
    let singular_values = &svd.singular_values;

    let largest = singular_values.iter().cloned().fold(0.0, f64::max);
    let tolerance = NULL_SPACE_TOLERANCE * largest;

    let null_indices: Vec<usize> = (0..singular_values.len())
        .filter(|&idx| singular_values[idx] <= tolerance)
        .collect();

    if null_indices.is_empty() {
        return Err(CpabError::DegenerateConstraints {
            n_params: n_cols,
            rank: n_cols,
        });
    }

    let mut basis = Array2::from_shape_fn((n_cols, null_indices.len()), |(param, vector)| {
        v_t[(null_indices[vector], param)]
    });

    for mut column in basis.columns_mut() {
        let dominant = column
            .iter()
            .cloned()
            .fold(0.0, |dominant: f64, value| {
                if value.abs() > dominant.abs() {
                    value
                } else {
                    dominant
                }
            });
        if dominant < 0.0 {
            column.mapv_inplace(|value| -value);
        }
    }

    Ok(basis)
}
