//! Tessellation of a 2D domain into triangles.
//!
//! Every rectangular grid cell is split along both diagonals into four
//! triangles sharing the cell center. Vertex keys live on a lattice refined by
//! a factor of two, so that cell centers get integer keys.

use super::{Subdivision, VertexKey};

/// Index of the triangle touching the lower edge of its grid cell.
pub const BOTTOM: usize = 0;
/// Index of the triangle touching the right edge of its grid cell.
pub const RIGHT: usize = 1;
/// Index of the triangle touching the upper edge of its grid cell.
pub const TOP: usize = 2;
/// Index of the triangle touching the left edge of its grid cell.
pub const LEFT: usize = 3;

/// Splits each grid cell of a 2D grid into four triangles.
#[derive(Clone, Copy, Debug)]
pub struct QuadTriangleSubdivision;

impl Subdivision for QuadTriangleSubdivision {
    fn ndim(&self) -> usize {
        2
    }

    fn n_subcells(&self) -> usize {
        4
    }

    fn lattice_scale(&self) -> usize {
        2
    }

    fn subcell_vertex_keys(&self, box_indices: &[usize], subcell: usize) -> Vec<VertexKey> {
        let (x0, y0) = (2 * box_indices[0], 2 * box_indices[1]);
        let (x1, y1) = (x0 + 2, y0 + 2);
        let center = [x0 + 1, y0 + 1, 0];

        let (a, b) = match subcell {
            BOTTOM => ([x0, y0, 0], [x1, y0, 0]),
            RIGHT => ([x1, y0, 0], [x1, y1, 0]),
            TOP => ([x1, y1, 0], [x0, y1, 0]),
            LEFT => ([x0, y1, 0], [x0, y0, 0]),
            _ => panic!("Invalid triangle index {}", subcell),
        };
        vec![a, b, center]
    }

    fn locate_subcell(&self, local_coords: &[f64]) -> usize {
        let (x, y) = (local_coords[0], local_coords[1]);
        if y <= x {
            if y <= 1.0 - x {
                BOTTOM
            } else {
                RIGHT
            }
        } else if y >= 1.0 - x {
            TOP
        } else {
            LEFT
        }
    }
}
