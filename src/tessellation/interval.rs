//! Tessellation of a 1D domain into contiguous intervals.

use super::{Subdivision, VertexKey};

/// Leaves every grid cell of a 1D grid as a single interval.
#[derive(Clone, Copy, Debug)]
pub struct IntervalSubdivision;

impl Subdivision for IntervalSubdivision {
    fn ndim(&self) -> usize {
        1
    }

    fn n_subcells(&self) -> usize {
        1
    }

    fn lattice_scale(&self) -> usize {
        1
    }

    fn subcell_vertex_keys(&self, box_indices: &[usize], _subcell: usize) -> Vec<VertexKey> {
        let i = box_indices[0];
        vec![[i, 0, 0], [i + 1, 0, 0]]
    }

    fn locate_subcell(&self, _local_coords: &[f64]) -> usize {
        0
    }
}
