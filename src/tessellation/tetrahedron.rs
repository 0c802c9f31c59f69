//! Tessellation of a 3D domain into tetrahedra.
//!
//! Every box is split along its main diagonal into six tetrahedra, one for each
//! ordering of the three axes (the Kuhn split). Tetrahedron `s` contains the
//! points whose local coordinates satisfy
//! `u[p[0]] >= u[p[1]] >= u[p[2]]` with `p = AXIS_ORDERINGS[s]`.
//! All boxes use the same split, so faces shared by neighbouring boxes are
//! triangulated identically.

use super::{Subdivision, VertexKey};

/// Axis orderings defining the six tetrahedra of a box.
pub const AXIS_ORDERINGS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Splits each box of a 3D grid into six tetrahedra.
#[derive(Clone, Copy, Debug)]
pub struct KuhnSubdivision;

impl Subdivision for KuhnSubdivision {
    fn ndim(&self) -> usize {
        3
    }

    fn n_subcells(&self) -> usize {
        AXIS_ORDERINGS.len()
    }

    fn lattice_scale(&self) -> usize {
        1
    }

    fn subcell_vertex_keys(&self, box_indices: &[usize], subcell: usize) -> Vec<VertexKey> {
        let ordering = AXIS_ORDERINGS[subcell];
        let mut key = [box_indices[0], box_indices[1], box_indices[2]];
        let mut keys = Vec::with_capacity(4);
        keys.push(key);
        for &axis in &ordering {
            key[axis] += 1;
            keys.push(key);
        }
        keys
    }

    fn locate_subcell(&self, local_coords: &[f64]) -> usize {
        let mut ordering = [0, 1, 2];
        // Stable sort on descending coordinate, ties resolved by axis number
        ordering.sort_by(|&a, &b| {
            local_coords[b]
                .partial_cmp(&local_coords[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        AXIS_ORDERINGS
            .iter()
            .position(|candidate| *candidate == ordering)
            .unwrap_or(0)
    }
}
