//! Tessellation of the unit hyper-cube into simplicial cells, and the
//! linear constraints coupling the affine maps of the cells.

pub mod interval;
pub mod tetrahedron;
pub mod triangle;

use crate::{config::CpabConfig, num::CFloat};
use interval::IntervalSubdivision;
use nalgebra::{DMatrix, DVector};
use ndarray::prelude::*;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};
use tetrahedron::KuhnSubdivision;
use triangle::QuadTriangleSubdivision;

/// Integer lattice coordinates identifying a tessellation vertex.
///
/// Components beyond the number of dimensions are zero.
pub type VertexKey = [usize; 3];

/// Defines how a single box of the regular grid is split into simplices.
pub trait Subdivision: fmt::Debug + Sync + Send {
    /// Returns the number of spatial dimensions the subdivision applies to.
    fn ndim(&self) -> usize;

    /// Returns the number of simplices each grid box is split into.
    fn n_subcells(&self) -> usize;

    /// Returns how many lattice units a grid box spans along each dimension.
    fn lattice_scale(&self) -> usize;

    /// Returns the lattice keys of the vertices of the given simplex
    /// in the grid box with the given indices.
    fn subcell_vertex_keys(&self, box_indices: &[usize], subcell: usize) -> Vec<VertexKey>;

    /// Finds the simplex containing the point with the given coordinates,
    /// which are local to the grid box and lie in `[0, 1]`.
    fn locate_subcell(&self, local_coords: &[f64]) -> usize;
}

static INTERVALS: IntervalSubdivision = IntervalSubdivision;
static TRIANGLES: QuadTriangleSubdivision = QuadTriangleSubdivision;
static TETRAHEDRA: KuhnSubdivision = KuhnSubdivision;

/// Result of looking up the cell containing a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellQuery {
    /// The point lies inside the domain, in the given cell.
    Inside(usize),
    /// The point lies outside the domain, and the given cell is the nearest one.
    Outside(usize),
}

impl CellQuery {
    /// Returns the found cell regardless of whether the point was inside.
    pub fn cell(&self) -> usize {
        match *self {
            Self::Inside(cell) | Self::Outside(cell) => cell,
        }
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, Self::Inside(_))
    }
}

/// A single simplicial cell of the tessellation.
#[derive(Clone, Debug)]
pub struct Cell {
    index: usize,
    box_indices: Vec<usize>,
    vertex_ids: Vec<usize>,
    vertices: Array2<f64>,
    neighbors: Vec<usize>,
}

impl Cell {
    /// Returns the index of the cell in the tessellation.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the indices of the grid box the cell belongs to.
    pub fn box_indices(&self) -> &[usize] {
        &self.box_indices
    }

    /// Returns the global ids of the vertices of the cell.
    pub fn vertex_ids(&self) -> &[usize] {
        &self.vertex_ids
    }

    /// Returns the vertex coordinates, one vertex per row.
    pub fn vertices(&self) -> ArrayView2<'_, f64> {
        self.vertices.view()
    }

    /// Returns the indices of the cells sharing a facet with this cell.
    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }

    /// Computes the centroid of the cell.
    pub fn center(&self) -> Array1<f64> {
        self.vertices
            .mean_axis(Axis(0))
            .expect("Cell has no vertices")
    }

    /// Computes the barycentric coordinates of the given point with respect
    /// to the vertices of the cell, or `None` if the cell is degenerate.
    pub fn barycentric_coords(&self, point: &[f64]) -> Option<Vec<f64>> {
        let ndim = self.vertices.ncols();
        let origin = self.vertices.row(0);
        let edges = DMatrix::from_fn(ndim, ndim, |dim, edge| {
            self.vertices[[edge + 1, dim]] - origin[dim]
        });
        let offset = DVector::from_fn(ndim, |dim, _| point[dim] - origin[dim]);
        let weights = edges.lu().solve(&offset)?;

        let mut coords = Vec::with_capacity(ndim + 1);
        coords.push(1.0 - weights.sum());
        coords.extend(weights.iter());
        Some(coords)
    }

    /// Whether the given point lies inside the cell, allowing the barycentric
    /// coordinates to be slightly negative.
    pub fn contains(&self, point: &[f64], epsilon: f64) -> bool {
        self.barycentric_coords(point)
            .is_some_and(|coords| coords.iter().all(|&coord| coord >= -epsilon))
    }
}

/// Two cells sharing a facet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedFacet {
    /// Indices of the two cells, in increasing order.
    pub cells: [usize; 2],
    /// Global ids of the vertices spanning the shared facet.
    pub vertex_ids: Vec<usize>,
}

/// A tessellation of the unit hyper-cube into simplicial cells.
#[derive(Clone, Debug)]
pub struct Tessellation {
    tess_size: Vec<usize>,
    zero_boundary: bool,
    volume_preserving: bool,
    subdivision: &'static dyn Subdivision,
    vertices: Vec<Vec<f64>>,
    boundary_vertices: Vec<bool>,
    cells: Vec<Cell>,
    shared_facets: Vec<SharedFacet>,
}

impl Tessellation {
    /// Builds the tessellation described by the given configuration.
    ///
    /// # Panics
    ///
    /// If the configuration has not been validated to have 1 to 3 dimensions
    /// and positive cell counts.
    pub fn new(config: &CpabConfig) -> Self {
        let tess_size = config.tess_size.clone();
        let ndim = tess_size.len();
        assert!(
            (1..=3).contains(&ndim) && tess_size.iter().all(|&count| count > 0),
            "Tessellation requires a validated configuration"
        );

        let subdivision: &'static dyn Subdivision = match ndim {
            1 => &INTERVALS,
            2 => &TRIANGLES,
            _ => &TETRAHEDRA,
        };
        debug_assert_eq!(subdivision.ndim(), ndim);
        let scale = subdivision.lattice_scale();

        let mut vertex_ids: HashMap<VertexKey, usize> = HashMap::new();
        let mut vertices = Vec::new();
        let mut boundary_vertices = Vec::new();
        let mut cells = Vec::with_capacity(config.n_cells());

        let n_boxes: usize = tess_size.iter().product();
        for box_idx in 0..n_boxes {
            let box_indices = unflatten_box_index(&tess_size, box_idx);
            for subcell in 0..subdivision.n_subcells() {
                let keys = subdivision.subcell_vertex_keys(&box_indices, subcell);
                let ids: Vec<usize> = keys
                    .iter()
                    .map(|key| {
                        *vertex_ids.entry(*key).or_insert_with(|| {
                            vertices.push(vertex_coords(key, &tess_size, scale));
                            boundary_vertices.push(is_boundary_key(key, &tess_size, scale));
                            vertices.len() - 1
                        })
                    })
                    .collect();

                let coords = Array2::from_shape_fn((ndim + 1, ndim), |(vertex, dim)| {
                    vertices[ids[vertex]][dim]
                });

                cells.push(Cell {
                    index: cells.len(),
                    box_indices: box_indices.clone(),
                    vertex_ids: ids,
                    vertices: coords,
                    neighbors: Vec::new(),
                });
            }
        }

        let shared_facets = find_shared_facets(&cells);
        for facet in &shared_facets {
            let [first, second] = facet.cells;
            cells[first].neighbors.push(second);
            cells[second].neighbors.push(first);
        }

        Self {
            tess_size,
            zero_boundary: config.zero_boundary,
            volume_preserving: config.volume_preserving,
            subdivision,
            vertices,
            boundary_vertices,
            cells,
            shared_facets,
        }
    }

    /// Returns the number of spatial dimensions.
    pub fn ndim(&self) -> usize {
        self.tess_size.len()
    }

    /// Returns the number of grid boxes along each dimension.
    pub fn tess_size(&self) -> &[usize] {
        &self.tess_size
    }

    /// Returns the number of cells.
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    /// Returns the coordinates of the vertex with the given global id.
    pub fn vertex(&self, vertex_id: usize) -> &[f64] {
        &self.vertices[vertex_id]
    }

    /// Returns the number of distinct vertices.
    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the vertex with the given global id lies on the domain boundary.
    pub fn is_boundary_vertex(&self, vertex_id: usize) -> bool {
        self.boundary_vertices[vertex_id]
    }

    /// Returns all pairs of cells sharing a facet.
    pub fn shared_facets(&self) -> &[SharedFacet] {
        &self.shared_facets
    }

    /// Returns the number of affine parameters per cell.
    pub fn params_per_cell(&self) -> usize {
        self.ndim() * (self.ndim() + 1)
    }

    /// Returns the total number of affine parameters over all cells.
    pub fn n_affine_params(&self) -> usize {
        self.n_cells() * self.params_per_cell()
    }

    /// Computes the centroids of all cells, one per row.
    pub fn cell_centers(&self) -> Array2<f64> {
        let mut centers = Array2::zeros((self.n_cells(), self.ndim()));
        for (cell, mut center) in self.cells.iter().zip(centers.rows_mut()) {
            center.assign(&cell.center());
        }
        centers
    }

    /// Finds the cell containing the given point.
    ///
    /// Points outside the domain are clamped onto it, and the cell containing
    /// the clamped point is reported as the nearest cell.
    pub fn find_cell<F: CFloat>(&self, point: &[F]) -> CellQuery {
        let ndim = self.ndim();
        let mut box_indices = [0; 3];
        let mut local_coords = [0.0; 3];
        let mut inside = true;

        for dim in 0..ndim {
            let coord: f64 = point[dim].into();
            if !(0.0..=1.0).contains(&coord) {
                inside = false;
            }
            let n_boxes = self.tess_size[dim];
            let scaled = coord.clamp(0.0, 1.0) * n_boxes as f64;
            let idx = usize::min(scaled.floor() as usize, n_boxes - 1);
            box_indices[dim] = idx;
            local_coords[dim] = scaled - idx as f64;
        }

        let subcell = self.subdivision.locate_subcell(&local_coords[..ndim]);
        let cell = self.subdivision.n_subcells()
            * flatten_box_index(&self.tess_size, &box_indices[..ndim])
            + subcell;

        if inside {
            CellQuery::Inside(cell)
        } else {
            CellQuery::Outside(cell)
        }
    }

    /// Returns the column of the given affine matrix entry of a cell in the
    /// flattened parameter vector.
    pub fn param_column(&self, cell: usize, row: usize, col: usize) -> usize {
        cell * self.params_per_cell() + row * (self.ndim() + 1) + col
    }

    /// Builds the matrix of all linear constraints on the flattened affine
    /// parameters: continuity across shared facets, and optionally zero
    /// velocity on the boundary and trace-free linear parts.
    pub fn constraint_matrix(&self) -> Array2<f64> {
        let mut rows = self.continuity_rows();
        if self.zero_boundary {
            rows.extend(self.zero_boundary_rows());
        }
        if self.volume_preserving {
            rows.extend(self.volume_preservation_rows());
        }

        let mut matrix = Array2::zeros((rows.len(), self.n_affine_params()));
        for (mut row, entries) in matrix.rows_mut().into_iter().zip(rows) {
            for (col, value) in entries {
                row[col] += value;
            }
        }
        matrix
    }

    fn homogeneous_vertex(&self, vertex_id: usize) -> Vec<f64> {
        let mut coords = self.vertices[vertex_id].clone();
        coords.push(1.0);
        coords
    }

    /// One row per shared vertex and dimension, equating the velocities of
    /// the two cells at the vertex.
    fn continuity_rows(&self) -> Vec<Vec<(usize, f64)>> {
        let ndim = self.ndim();
        let mut rows = Vec::new();
        for facet in &self.shared_facets {
            let [first, second] = facet.cells;
            for &vertex_id in &facet.vertex_ids {
                let point = self.homogeneous_vertex(vertex_id);
                for row in 0..ndim {
                    let mut entries = Vec::with_capacity(2 * (ndim + 1));
                    for (col, &coord) in point.iter().enumerate() {
                        entries.push((self.param_column(first, row, col), coord));
                        entries.push((self.param_column(second, row, col), -coord));
                    }
                    rows.push(entries);
                }
            }
        }
        rows
    }

    /// One row per cell, boundary vertex of the cell and dimension, setting
    /// the velocity at the vertex to zero.
    fn zero_boundary_rows(&self) -> Vec<Vec<(usize, f64)>> {
        let ndim = self.ndim();
        let mut rows = Vec::new();
        for cell in &self.cells {
            for &vertex_id in cell.vertex_ids() {
                if !self.boundary_vertices[vertex_id] {
                    continue;
                }
                let point = self.homogeneous_vertex(vertex_id);
                for row in 0..ndim {
                    rows.push(
                        point
                            .iter()
                            .enumerate()
                            .map(|(col, &coord)| (self.param_column(cell.index, row, col), coord))
                            .collect(),
                    );
                }
            }
        }
        rows
    }

    /// One row per cell, setting the trace of the linear part to zero.
    fn volume_preservation_rows(&self) -> Vec<Vec<(usize, f64)>> {
        let ndim = self.ndim();
        self.cells
            .iter()
            .map(|cell| {
                (0..ndim)
                    .map(|dim| (self.param_column(cell.index, dim, dim), 1.0))
                    .collect()
            })
            .collect()
    }
}

fn unflatten_box_index(tess_size: &[usize], mut flat_idx: usize) -> Vec<usize> {
    tess_size
        .iter()
        .map(|&size| {
            let idx = flat_idx % size;
            flat_idx /= size;
            idx
        })
        .collect()
}

fn flatten_box_index(tess_size: &[usize], box_indices: &[usize]) -> usize {
    let mut stride = 1;
    let mut flat_idx = 0;
    for (&idx, &size) in box_indices.iter().zip(tess_size) {
        flat_idx += idx * stride;
        stride *= size;
    }
    flat_idx
}

fn vertex_coords(key: &VertexKey, tess_size: &[usize], scale: usize) -> Vec<f64> {
    tess_size
        .iter()
        .enumerate()
        .map(|(dim, &size)| key[dim] as f64 / (scale * size) as f64)
        .collect()
}

fn is_boundary_key(key: &VertexKey, tess_size: &[usize], scale: usize) -> bool {
    tess_size
        .iter()
        .enumerate()
        .any(|(dim, &size)| key[dim] == 0 || key[dim] == scale * size)
}

/// Finds all facets shared by exactly two cells, in deterministic order.
fn find_shared_facets(cells: &[Cell]) -> Vec<SharedFacet> {
    let mut facet_owners: BTreeMap<Vec<usize>, Vec<usize>> = BTreeMap::new();
    for cell in cells {
        let n_vertices = cell.vertex_ids.len();
        for omitted in 0..n_vertices {
            let mut facet: Vec<usize> = cell
                .vertex_ids
                .iter()
                .enumerate()
                .filter(|&(vertex, _)| vertex != omitted)
                .map(|(_, &id)| id)
                .collect();
            facet.sort_unstable();
            facet_owners.entry(facet).or_default().push(cell.index);
        }
    }

    facet_owners
        .into_iter()
        .filter_map(|(vertex_ids, owners)| match owners[..] {
            [first, second] => Some(SharedFacet {
                cells: [usize::min(first, second), usize::max(first, second)],
                vertex_ids,
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::num::CONTAINMENT_EPSILON;

    fn tessellation(
        tess_size: &[usize],
        zero_boundary: bool,
        volume_preserving: bool,
    ) -> Tessellation {
        Tessellation::new(
            &CpabConfig::new(tess_size)
                .with_zero_boundary(zero_boundary)
                .with_volume_preservation(volume_preserving),
        )
    }

    #[test]
    fn interval_tessellation_has_chain_adjacency() {
        let tess = tessellation(&[4], false, false);
        assert_eq!(tess.n_cells(), 4);
        assert_eq!(tess.n_vertices(), 5);
        assert_eq!(tess.shared_facets().len(), 3);
        assert_eq!(tess.cell(0).neighbors(), &[1]);
        let mut neighbors = tess.cell(2).neighbors().to_vec();
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![1, 3]);
    }

    #[test]
    fn triangle_tessellation_has_expected_topology() {
        let tess = tessellation(&[2, 3], false, false);
        assert_eq!(tess.n_cells(), 24);
        // Corners of a 3x4 lattice plus one center per rectangle
        assert_eq!(tess.n_vertices(), 12 + 6);
        // Four diagonals per rectangle plus interior rectangle edges
        let interior_edges = (2 - 1) * 3 + 2 * (3 - 1);
        assert_eq!(tess.shared_facets().len(), 4 * 6 + interior_edges);
        for cell in tess.cells() {
            assert!(cell.neighbors().len() >= 2 && cell.neighbors().len() <= 3);
        }
    }

    #[test]
    fn tetrahedron_tessellation_is_conforming() {
        let tess = tessellation(&[2, 2, 2], false, false);
        assert_eq!(tess.n_cells(), 48);
        assert_eq!(tess.n_vertices(), 27);
        // Every triangular face is either on the boundary or shared by two cells
        let n_faces = 4 * tess.n_cells();
        let n_boundary_faces = 6 * 4 * 2;
        assert_eq!(2 * tess.shared_facets().len() + n_boundary_faces, n_faces);
    }

    #[test]
    fn cells_are_ordered_by_box_with_first_dimension_fastest() {
        let tess = tessellation(&[2, 3], false, false);
        let n_subcells = tess.n_cells() / 6;
        assert_eq!(n_subcells, 4);
        for cell in tess.cells() {
            let box_indices = cell.box_indices();
            let box_idx = box_indices[0] + 2 * box_indices[1];
            assert_eq!(cell.index() / n_subcells, box_idx);
            for vertex in cell.vertices().rows() {
                for (dim, &coord) in vertex.iter().enumerate() {
                    let lower = box_indices[dim] as f64 / tess.tess_size()[dim] as f64;
                    let upper = (box_indices[dim] + 1) as f64 / tess.tess_size()[dim] as f64;
                    assert!(coord >= lower - 1e-12 && coord <= upper + 1e-12);
                }
            }
        }
    }

    #[test]
    fn find_cell_agrees_with_barycentric_containment() {
        for tess_size in [vec![3], vec![2, 3], vec![2, 1, 3]] {
            let tess = tessellation(&tess_size, true, false);
            let ndim = tess.ndim();
            for i in 0..7 {
                let point: Vec<f64> = (0..ndim)
                    .map(|dim| (0.07 + 0.13 * i as f64 + 0.29 * dim as f64) % 1.0)
                    .collect();
                let query = tess.find_cell(&point);
                assert!(query.is_inside());
                let cell = tess.cell(query.cell());
                assert!(
                    cell.contains(&point, CONTAINMENT_EPSILON),
                    "Point {:?} not inside cell {}",
                    point,
                    query.cell()
                );
            }
        }
    }

    #[test]
    fn points_outside_domain_map_to_nearest_cell() {
        let tess = tessellation(&[2, 2], false, false);
        let query = tess.find_cell(&[1.5f32, 0.25]);
        assert!(!query.is_inside());
        let nearest = tess.cell(query.cell());
        assert!(nearest.contains(&[1.0, 0.25], CONTAINMENT_EPSILON));

        let tess = tessellation(&[3], false, false);
        assert_eq!(tess.find_cell(&[-0.2f64]), CellQuery::Outside(0));
        assert_eq!(tess.find_cell(&[1.0f64]), CellQuery::Inside(2));
    }

    #[test]
    fn constraint_matrix_has_expected_shape() {
        let tess = tessellation(&[2], true, false);
        let constraints = tess.constraint_matrix();
        // One continuity row and two boundary rows
        assert_eq!(constraints.dim(), (3, 4));

        let tess = tessellation(&[1, 1], false, true);
        let constraints = tess.constraint_matrix();
        // Four diagonals with two vertices and two dimensions each, and one trace row per cell
        assert_eq!(constraints.dim(), (4 * 2 * 2 + 4, 4 * 6));
    }

    #[test]
    fn constraints_vanish_for_global_affine_map() {
        let tess = tessellation(&[2, 2], false, true);
        let constraints = tess.constraint_matrix();
        // The same trace-free affine map in every cell satisfies all constraints
        let cell_params = [0.3, -0.1, 0.2, 0.5, -0.3, 0.7];
        let params = Array1::from_shape_fn(tess.n_affine_params(), |idx| {
            cell_params[idx % cell_params.len()]
        });
        let residual = constraints.dot(&params);
        assert!(residual.iter().all(|value| value.abs() < 1e-12));
    }
}
