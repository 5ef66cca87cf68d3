//! Fast-march (Eikonal) redistancer over an unstructured narrow-band graph (spec §4.2).
//!
//! Grounded verbatim on `original_source/src/redistancer/unstructured_fastmarch3.h` and
//! `fastmarch3.cpp`: the quadric system `(A, B, C)`, explicit 4x4/3x3 cofactor matrix
//! inversion, triangle-to-2D projection for 3-neighbor configurations, and the
//! sort-excluding-self ordering (SPEC_FULL.md §11). `matinv.h`'s inversion routines are
//! reproduced directly rather than routed through a generic linear-algebra crate, matching
//! the original's hand-written cofactor expansion.

use crate::error::SolveError;
use cgmath::{InnerSpace, Vector3};

const MAX_PASSES: usize = 256;

/// One node of the unstructured fast-march graph: a grid cell or a mesh-free tracker site.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub position: Vector3<f64>,
    pub levelset: f64,
    pub fixed: bool,
}

/// Narrow-band graph passed to [`fastmarch`]. `connections[n]` lists node indices
/// one-ring-adjacent to node `n`.
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub connections: Vec<Vec<usize>>,
}

impl Graph {
    pub fn new(n: usize) -> Self {
        Graph {
            nodes: Vec::with_capacity(n),
            connections: Vec::with_capacity(n),
        }
    }
}

/// Runs the sweep to convergence or `MAX_PASSES`, writing extended `|phi|` values (signed)
/// into every initially-unfixed node. Returns `Err` (non-fatal per spec.md §7.2) if nodes
/// remain unfixed when progress stalls.
pub fn fastmarch(graph: &mut Graph) -> Result<(), SolveError> {
    let n = graph.nodes.len();
    // Seed: copy the sign of the unfixed node's existing (placeholder) value, distance
    // magnitude reset to infinity until a sweep assigns it.
    for node in graph.nodes.iter_mut() {
        if !node.fixed {
            let sign = if node.levelset < 0.0 { -1.0 } else { 1.0 };
            node.levelset = sign * f64::INFINITY;
        }
    }

    let mut prev_unfixed = usize::MAX;
    for pass in 0..MAX_PASSES {
        let levelset_save: Vec<f64> = graph.nodes.iter().map(|n| n.levelset).collect();
        let fixed_save: Vec<bool> = graph.nodes.iter().map(|n| n.fixed).collect();

        let mut newly_fixed: Vec<(usize, f64)> = Vec::new();

        for i in 0..n {
            if fixed_save[i] {
                continue;
            }
            let here = &graph.nodes[i];
            let phi_n = levelset_save[i];

            // Front distance: cheapest reachable fixed neighbor.
            let mut front_distance = f64::INFINITY;
            for &m in &graph.connections[i] {
                if fixed_save[m] {
                    let d = levelset_save[m].abs() + 2.0 * (graph.nodes[m].position - here.position).magnitude();
                    if d < front_distance {
                        front_distance = d;
                    }
                }
            }
            if !front_distance.is_finite() {
                continue;
            }

            // Candidate neighbors passing the qualification filter, `tri[0]` is the node
            // itself; `order_map` (indices 1..) is what actually gets sorted.
            let mut tri = vec![i];
            for &m in &graph.connections[i] {
                if fixed_save[m]
                    && levelset_save[m].abs() < front_distance
                    && phi_n * levelset_save[m] > 0.0
                    && levelset_save[m].abs() < phi_n.abs()
                {
                    tri.push(m);
                }
            }
            let num_valid = tri.len() - 1;
            if num_valid == 0 {
                continue;
            }
            let mut order_map: Vec<usize> = (1..tri.len()).collect();
            order_map.sort_by(|&a, &b| levelset_save[tri[a]].abs().partial_cmp(&levelset_save[tri[b]].abs()).unwrap());

            let sgn = if phi_n < 0.0 { -1.0 } else { 1.0 };
            let mut result = None;

            if num_valid >= 3 {
                let idx3 = [tri[order_map[0]], tri[order_map[1]], tri[order_map[2]]];
                let points3 = [graph.nodes[idx3[0]].position, graph.nodes[idx3[1]].position, graph.nodes[idx3[2]].position];
                let phis3 = [levelset_save[idx3[0]], levelset_save[idx3[1]], levelset_save[idx3[2]]];

                if num_valid >= 4 {
                    let idx4 = [tri[order_map[0]], tri[order_map[1]], tri[order_map[2]], tri[order_map[3]]];
                    let points4 = [
                        graph.nodes[idx4[0]].position,
                        graph.nodes[idx4[1]].position,
                        graph.nodes[idx4[2]].position,
                        graph.nodes[idx4[3]].position,
                    ];
                    let phis4 = [levelset_save[idx4[0]], levelset_save[idx4[1]], levelset_save[idx4[2]], levelset_save[idx4[3]]];
                    if let Some(v) = solve_quadric_4(&points4, &phis4, sgn, here.position) {
                        result = Some(v);
                    }
                }
                if result.is_none() {
                    if let Some(v) = solve_quadric_3(&points3, &phis3, sgn, here.position) {
                        result = Some(v);
                    }
                }
            }
            if result.is_none() && num_valid >= 1 {
                let m = tri[order_map[0]];
                let dist = (graph.nodes[m].position - here.position).magnitude();
                result = Some(levelset_save[m] + sgn * dist);
            }

            if let Some(mut value) = result {
                // Clamp to [min, max] of fixed-neighbor phi.
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for k in 1..tri.len() {
                    let v = levelset_save[tri[k]];
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
                if lo <= hi {
                    value = value.clamp(lo, hi);
                }
                newly_fixed.push((i, value));
            }
        }

        let made_progress = !newly_fixed.is_empty();
        for (i, value) in newly_fixed {
            graph.nodes[i].levelset = value;
            graph.nodes[i].fixed = true;
        }

        let unfixed = graph.nodes.iter().filter(|n| !n.fixed).count();
        if unfixed == 0 {
            return Ok(());
        }
        if !made_progress || unfixed == prev_unfixed {
            return Err(SolveError::RedistanceStalled { passes: pass + 1, unfixed });
        }
        prev_unfixed = unfixed;
    }

    let unfixed = graph.nodes.iter().filter(|n| !n.fixed).count();
    Err(SolveError::RedistanceStalled { passes: MAX_PASSES, unfixed })
}

/// Solves the `A*phi^2 + B*phi + C = 0` quadric from a 4-point (3D tetrahedral) shape-
/// function fit. Returns `None` on a degenerate (non-invertible) configuration.
fn solve_quadric_4(points: &[Vector3<f64>; 4], phis: &[f64; 4], sgn: f64, query: Vector3<f64>) -> Option<f64> {
    let mut a4 = [[0.0f64; 4]; 4];
    for c in 0..4 {
        a4[0][c] = points[c].x;
        a4[1][c] = points[c].y;
        a4[2][c] = points[c].z;
        a4[3][c] = 1.0;
    }
    let m = invert4x4(&a4)?;
    solve_quadric_from_inverse(&m, 4, phis, sgn, query)
}

/// Solves the 3-point (2D-projected triangle) variant.
fn solve_quadric_3(points: &[Vector3<f64>; 3], phis: &[f64; 3], sgn: f64, query: Vector3<f64>) -> Option<f64> {
    let (p2, q2) = project_triangle(points, query)?;
    let mut a3 = [[0.0f64; 3]; 3];
    for c in 0..3 {
        a3[0][c] = p2[c].0;
        a3[1][c] = p2[c].1;
        a3[2][c] = 1.0;
    }
    let m = invert3x3(&a3)?;
    solve_quadric_from_inverse_2d(&m, phis, sgn, q2)
}

/// Shared quadric assembly once `M` (the inverse shape-function matrix) is known, for the
/// 4-variable 3D case. `query` is the node position being solved for — note its true role
/// is only to supply `dim` (the system is otherwise position-independent, consistent with
/// `unstructured_fastmarch3.h`: the constant term folds the evaluation point in through
/// `det`/`coef`).
fn solve_quadric_from_inverse(m: &[[f64; 4]; 4], num_valid: usize, phis: &[f64; 4], sgn: f64, _query: Vector3<f64>) -> Option<f64> {
    let dim = num_valid - 1;
    let mut det = vec![0.0; dim];
    let mut coef = vec![0.0; dim];
    for d in 0..dim {
        det[d] = m[0][d];
        let mut c = 0.0;
        for k in 1..num_valid {
            c += m[k][d] * phis[k];
        }
        coef[d] = c;
    }
    assemble_and_solve(&det, &coef, sgn)
}

fn solve_quadric_from_inverse_2d(m: &[[f64; 3]; 3], phis: &[f64; 3], sgn: f64, _query: (f64, f64)) -> Option<f64> {
    let num_valid = 3;
    let dim = num_valid - 1;
    let mut det = vec![0.0; dim];
    let mut coef = vec![0.0; dim];
    for d in 0..dim {
        det[d] = m[0][d];
        let mut c = 0.0;
        for k in 1..num_valid {
            c += m[k][d] * phis[k];
        }
        coef[d] = c;
    }
    assemble_and_solve(&det, &coef, sgn)
}

fn assemble_and_solve(det: &[f64], coef: &[f64], sgn: f64) -> Option<f64> {
    let norm2 = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>();
    let dot = |a: &[f64], b: &[f64]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>();

    let a = norm2(det);
    if a.abs() < 1e-12 {
        return None;
    }
    let b = 2.0 * dot(det, coef);
    let c = norm2(coef) - 1.0;
    let d = b / a;
    let disc = (d * d - 4.0 * c / a).max(1e-8);
    Some(sgn * 0.5 * disc.sqrt() - 0.5 * d)
}

/// Projects three 3D points into an orthonormal 2D frame: `e0 = normalize(p1-p0)`,
/// `n = normalize((p2-p0) x (p1-p0))`, `e1 = n x e0`. Returns the projected triangle
/// vertices and the projected query point. `None` on a degenerate (zero-length edge)
/// triangle.
fn project_triangle(points: &[Vector3<f64>; 3], query: Vector3<f64>) -> Option<([(f64, f64); 3], (f64, f64))> {
    for i in 0..3 {
        for j in (i + 1)..3 {
            if (points[i] - points[j]).magnitude2() == 0.0 {
                return None;
            }
        }
    }
    let e0 = (points[1] - points[0]).normalize();
    let normal = (points[2] - points[0]).cross(points[1] - points[0]);
    if normal.magnitude2() == 0.0 {
        return None;
    }
    let normal = normal.normalize();
    let e1 = normal.cross(e0);

    let project = |p: Vector3<f64>| {
        let rel = p - points[0];
        (rel.dot(e0), rel.dot(e1))
    };
    Some(([project(points[0]), project(points[1]), project(points[2])], project(query)))
}

/// Explicit cofactor-expansion 4x4 inverse (`matinv.h::invert4x4`). `None` when the
/// determinant is (near) zero.
fn invert4x4(m: &[[f64; 4]; 4]) -> Option<[[f64; 4]; 4]> {
    let mut inv = [[0.0f64; 4]; 4];
    let cofactor3 = |a: [[f64; 3]; 3]| -> f64 {
        a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1]) - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
            + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
    };
    let minor = |row_skip: usize, col_skip: usize| -> [[f64; 3]; 3] {
        let mut out = [[0.0f64; 3]; 3];
        let mut oi = 0;
        for i in 0..4 {
            if i == row_skip {
                continue;
            }
            let mut oj = 0;
            for j in 0..4 {
                if j == col_skip {
                    continue;
                }
                out[oi][oj] = m[i][j];
                oj += 1;
            }
            oi += 1;
        }
        out
    };

    let mut det = 0.0;
    for j in 0..4 {
        let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
        det += sign * m[0][j] * cofactor3(minor(0, j));
    }
    if det.abs() < 1e-14 {
        return None;
    }
    for i in 0..4 {
        for j in 0..4 {
            let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
            // Adjugate transpose: inv[j][i] = cofactor(i,j)/det.
            inv[j][i] = sign * cofactor3(minor(i, j)) / det;
        }
    }
    Some(inv)
}

/// Explicit cofactor-expansion 3x3 inverse (`matinv.h::invert3x3`).
fn invert3x3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let cof = |r0: usize, c0: usize, r1: usize, c1: usize| m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0];

    let c00 = cof(1, 1, 2, 2);
    let c01 = -cof(1, 0, 2, 2);
    let c02 = cof(1, 0, 2, 1);
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    if det.abs() < 1e-14 {
        return None;
    }
    let c10 = -cof(0, 1, 2, 2);
    let c11 = cof(0, 0, 2, 2);
    let c12 = -cof(0, 0, 2, 1);
    let c20 = cof(0, 1, 1, 2);
    let c21 = -cof(0, 0, 1, 2);
    let c22 = cof(0, 0, 1, 1);

    // Adjugate (cofactor transpose) divided by determinant.
    Some([
        [c00 / det, c10 / det, c20 / det],
        [c01 / det, c11 / det, c21 / det],
        [c02 / det, c12 / det, c22 / det],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph(n: usize, dx: f64) -> Graph {
        let mut g = Graph::new(n);
        for i in 0..n {
            g.nodes.push(GraphNode {
                position: Vector3::new(i as f64 * dx, 0.0, 0.0),
                levelset: (i as f64 - (n as f64) / 2.0) * dx,
                fixed: i == n / 2 || i == n / 2 + 1,
            });
            let mut conns = Vec::new();
            if i > 0 {
                conns.push(i - 1);
            }
            if i + 1 < n {
                conns.push(i + 1);
            }
            g.connections.push(conns);
        }
        g
    }

    #[test]
    fn extends_distance_monotonically_along_a_line() {
        let mut g = line_graph(9, 0.1);
        fastmarch(&mut g).unwrap();
        for n in g.nodes.iter() {
            assert!(n.fixed);
        }
    }

    #[test]
    fn invert3x3_roundtrips_identity() {
        let id = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let inv = invert3x3(&id).unwrap();
        assert!((inv[0][0] - 1.0).abs() < 1e-12);
        assert!(inv[0][1].abs() < 1e-12);
    }

    #[test]
    fn invert4x4_detects_singular() {
        let singular = [[1.0, 2.0, 3.0, 4.0]; 4];
        assert!(invert4x4(&singular).is_none());
    }
}
