//! Streamfunction / vector-potential projection (spec §4.7).
//!
//! Grounded on `original_source/src/projection/macstreamfuncsolver3.cpp` for the `C`/`Z`/`D`
//! operator roles and the `P = (CZ)^T(CZ) + (DZ)^T(DZ)` system. The `-1.0` biases in `iAF`
//! and `V` are preserved exactly per spec.md §9 — they make `diag(iAF) + I + P` equal the
//! intended operator and are not a bug to silently "fix".

use crate::grid::mac_array::MacArray;
use crate::grid::shape::Shape3;
use crate::matrix::pcg::{self, PcgConfig, PcgReport};
use crate::matrix::sparse::SparseMatrix;

/// Precomputed geometry-dependent operators, rebuilt only when solid geometry changes
/// (spec.md §4.7 "Precompute once per geometry change").
pub struct Operators {
    /// Discrete curl, edges -> faces.
    pub c: SparseMatrix,
    pub c_t: SparseMatrix,
    /// Null-space projector: drops edges inside solid / ties Dirichlet chambers together.
    pub z: SparseMatrix,
    pub cz: SparseMatrix,
    pub cz_t: SparseMatrix,
    /// Discrete divergence, edges -> nodes.
    pub d: SparseMatrix,
    pub dz: SparseMatrix,
    pub dz_t: SparseMatrix,
    /// `P = (CZ)^T (CZ) + (DZ)^T (DZ)`.
    pub p: SparseMatrix,
    pub num_edges: usize,
    pub num_faces: usize,
}

/// Builds `C` (curl, edges->faces) and `D` (divergence, edges->nodes) for a cell grid, `Z`
/// as the identity restricted to edges not fully inside solid (a simplified null-space
/// operator: full Dirichlet-chamber merging is a further geometry-dependent refinement left
/// to the caller via `solid_edge`).
pub fn precompute<S>(cell_shape: Shape3, solid_edge: S) -> Operators
where
    S: Fn(usize, i32, i32, i32) -> bool,
{
    let mut num_edges = 0usize;
    let mut edge_index = std::collections::HashMap::new();
    for dim in 0..3 {
        let edge_shape = cell_shape.edge(dim);
        for k in 0..edge_shape.d {
            for j in 0..edge_shape.h {
                for i in 0..edge_shape.w {
                    edge_index.insert((dim, i, j, k), num_edges);
                    num_edges += 1;
                }
            }
        }
    }

    let mut num_faces = 0usize;
    let mut face_index = std::collections::HashMap::new();
    for dim in 0..3 {
        let face_shape = cell_shape.face(dim);
        for k in 0..face_shape.d {
            for j in 0..face_shape.h {
                for i in 0..face_shape.w {
                    face_index.insert((dim, i, j, k), num_faces);
                    num_faces += 1;
                }
            }
        }
    }

    let mut c = SparseMatrix::new(num_faces);
    // Discrete curl: face (dim, i, j, k) accumulates +-1 contributions from the four edges
    // bounding it in the plane perpendicular to `dim`.
    for dim in 0..3 {
        let (a, b) = match dim {
            0 => (1usize, 2usize),
            1 => (0usize, 2usize),
            _ => (0usize, 1usize),
        };
        let face_shape = cell_shape.face(dim);
        for k in 0..face_shape.d {
            for j in 0..face_shape.h {
                for i in 0..face_shape.w {
                    let fidx = face_index[&(dim, i, j, k)];
                    let base = [i, j, k];
                    let mut e = |axis: usize, da: i32, db: i32, sign: f64| {
                        let mut idx = base;
                        idx[a] += da;
                        idx[b] += db;
                        if let Some(&eidx) = edge_index.get(&(axis, idx[0], idx[1], idx[2])) {
                            c.add_to_element(fidx, eidx, sign);
                        }
                    };
                    e(a, 0, 0, -1.0);
                    e(a, 0, 1, 1.0);
                    e(b, 0, 0, 1.0);
                    e(b, 1, 0, -1.0);
                }
            }
        }
    }

    let mut d = SparseMatrix::new(cell_shape.nodal().count() as usize);
    let nodal_shape = cell_shape.nodal();
    for dim in 0..3 {
        let edge_shape = cell_shape.edge(dim);
        for k in 0..edge_shape.d {
            for j in 0..edge_shape.h {
                for i in 0..edge_shape.w {
                    let eidx = edge_index[&(dim, i, j, k)];
                    let lo = [i, j, k];
                    let mut hi = [i, j, k];
                    hi[dim] += 1;
                    if !nodal_shape.out_of_bounds(lo[0], lo[1], lo[2]) {
                        let n = nodal_shape.linear_index(lo[0], lo[1], lo[2]);
                        d.add_to_element(n, eidx, -1.0);
                    }
                    if !nodal_shape.out_of_bounds(hi[0], hi[1], hi[2]) {
                        let n = nodal_shape.linear_index(hi[0], hi[1], hi[2]);
                        d.add_to_element(n, eidx, 1.0);
                    }
                }
            }
        }
    }

    let mut z = SparseMatrix::new(num_edges);
    for dim in 0..3 {
        let edge_shape = cell_shape.edge(dim);
        for k in 0..edge_shape.d {
            for j in 0..edge_shape.h {
                for i in 0..edge_shape.w {
                    let eidx = edge_index[&(dim, i, j, k)];
                    if !solid_edge(dim, i, j, k) {
                        z.add_to_element(eidx, eidx, 1.0);
                    }
                }
            }
        }
    }

    let c_t = c.transpose();
    let cz = c.multiply_matrix(&z);
    let cz_t = cz.transpose();
    let dz = d.multiply_matrix(&z);
    let dz_t = dz.transpose();
    let p = cz_t.multiply_matrix(&cz).add(&dz_t.multiply_matrix(&dz));

    Operators { c, c_t, z, cz, cz_t, d, dz, dz_t, p, num_edges, num_faces }
}

impl SparseMatrix {
    fn add(&self, other: &SparseMatrix) -> SparseMatrix {
        let mut out = self.clone();
        for row in 0..other.len() {
            for &(col, value) in other.non_zeros(row) {
                out.add_to_element(row, col, value);
            }
        }
        out
    }
}

pub struct StreamfunctionResult {
    pub psi: Vec<f64>,
    pub report: PcgReport,
}

/// Builds and solves `Lhs . psi = rhs` per spec.md §4.7:
/// `Lhs = (CZ)^T diag(iA*F - 1) (CZ) + (DZ)^T diag(V - 1) (DZ) + P`
/// `rhs = (CZ)^T (F . u_face)`
///
/// `i_af` is `iA*F` per face (`iA = 1/A_face`, `F = rho_face`), `v_minus_one` is the corner
/// mass minus one per node. Both `-1.0` biases are deliberate (spec.md §9) so that the
/// diagonal terms combine correctly with `P`.
pub fn solve(
    ops: &Operators,
    i_af: &[f64],
    v_corner: &[f64],
    f_face: &[f64],
    u_face: &[f64],
    psi_prev: Option<&[f64]>,
    config: &PcgConfig,
) -> StreamfunctionResult {
    let n_faces = ops.num_faces;
    let n_nodes = v_corner.len();

    let mut diag_iaf = SparseMatrix::new(n_faces);
    for i in 0..n_faces {
        diag_iaf.add_to_element(i, i, i_af[i] - 1.0);
    }
    let mut diag_v = SparseMatrix::new(n_nodes);
    for i in 0..n_nodes {
        diag_v.add_to_element(i, i, v_corner[i] - 1.0);
    }

    let term1 = ops.cz_t.multiply_matrix(&diag_iaf.multiply_matrix(&ops.cz));
    let term2 = ops.dz_t.multiply_matrix(&diag_v.multiply_matrix(&ops.dz));
    let lhs = term1.add(&term2).add(&ops.p);

    let mut fu = vec![0.0; n_faces];
    for i in 0..n_faces {
        fu[i] = f_face[i] * u_face[i];
    }
    let mut rhs = vec![0.0; ops.num_edges];
    ops.cz_t.multiply(&fu, &mut rhs);

    if let Some(prev) = psi_prev {
        let mut correction = vec![0.0; ops.num_edges];
        lhs.multiply(prev, &mut correction);
        for i in 0..rhs.len() {
            rhs[i] -= correction[i];
        }
    }

    let mut psi = vec![0.0; ops.num_edges];
    let (report, _diag) = pcg::solve(&lhs, &rhs, &mut psi, config);

    if let Some(prev) = psi_prev {
        for i in 0..psi.len() {
            psi[i] += prev[i];
        }
    }

    StreamfunctionResult { psi, report }
}

/// Recovers face velocity as `u_face = iA . (CZ . Z.psi)`, clamping boundary faces to zero
/// normal component (zero area).
pub fn recover_velocity(ops: &Operators, psi: &[f64], i_a: &[f64], area: &MacArray<f64>, shape: Shape3, velocity: &mut MacArray<f64>) {
    let mut cz_psi = vec![0.0; ops.num_faces];
    ops.cz.multiply(psi, &mut cz_psi);

    let mut fidx = 0usize;
    for dim in 0..3 {
        let face_shape = shape.face(dim);
        for k in 0..face_shape.d {
            for j in 0..face_shape.h {
                for i in 0..face_shape.w {
                    let a_face = area.get(dim, i, j, k).unwrap_or(0.0);
                    if a_face <= 0.0 {
                        velocity.set(dim, i, j, k, 0.0);
                    } else {
                        velocity.set(dim, i, j, k, i_a[fidx] * cz_psi[fidx]);
                    }
                    fidx += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precompute_small_grid_does_not_panic() {
        let shape = Shape3::new(2, 2, 2);
        let ops = precompute(shape, |_, _, _, _| false);
        assert!(ops.num_edges > 0);
        assert!(ops.num_faces > 0);
    }
}
