//! Pressure-Poisson projection for variable-density free-surface flow (spec §4.6).
//!
//! Grounded on `blub::simulation::pressure_solver` (matrix assembly from area/density
//! fractions, PCG solve, pressure-gradient velocity update — same shape, ported from GPU
//! compute passes to the CPU [`crate::matrix::pcg`] solver) and
//! `original_source/src/utility/macutility3.cpp` for fraction clamping constants.

use std::collections::HashMap;

use crate::error::SolveError;
use crate::grid::mac_array::MacArray;
use crate::grid::shape::Shape3;
use crate::matrix::pcg::{self, PcgConfig, PcgReport};
use crate::matrix::sparse::SparseMatrix;

/// Persistent volume-correction PI-controller state (spec.md §4.6 "Volume correction").
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeController {
    pub initial_volume: Option<f64>,
    pub integral: f64,
}

impl VolumeController {
    /// Computes the RHS bias added to every row of the Poisson system.
    pub fn bias(&mut self, current_volume: f64, target_volume: f64, gain: f64, dt: f64) -> f64 {
        let v0 = *self.initial_volume.get_or_insert(current_volume);
        let _ = v0;
        if target_volume.abs() < 1e-12 {
            return 0.0;
        }
        let x = (current_volume - target_volume) / target_volume;
        self.integral += x * dt;
        let k_p = gain * 2.3 / (25.0 * dt.max(1e-12));
        let k_i = k_p * k_p / 16.0;
        -(k_p * x + k_i * self.integral) / (x + 1.0)
    }
}

pub struct PressureResult {
    pub pressure: Vec<f64>,
    pub report: PcgReport,
    pub diagnostic: Option<SolveError>,
}

/// Enumerates inside-fluid cells (fluid < 0 and connected to the system via at least one
/// positive-area positive-density face), assigns row indices, builds and solves the
/// symmetric Poisson system, and writes pressure back as a dense per-cell array aligned
/// with `fluid`. Empty systems (spec.md §7 "Empty system") return a zero pressure field
/// with no solve performed.
pub fn solve(
    shape: Shape3,
    dt: f64,
    fluid: &[f64],
    area: &MacArray<f64>,
    density: &MacArray<f64>,
    velocity: &MacArray<f64>,
    rhs_bias: f64,
    config: &PcgConfig,
) -> PressureResult {
    let dx = shape.dx();
    let n_cells = shape.count() as usize;

    let mut row_of = HashMap::new();
    for k in 0..shape.d {
        for j in 0..shape.h {
            for i in 0..shape.w {
                let idx = shape.linear_index(i, j, k);
                if fluid[idx] < 0.0 {
                    row_of.insert(idx, row_of.len());
                }
            }
        }
    }

    if row_of.is_empty() {
        return PressureResult {
            pressure: vec![0.0; n_cells],
            report: PcgReport { iterations: 0, residual: 0.0, converged: true, used_fallback_preconditioner: false },
            diagnostic: None,
        };
    }

    let n = row_of.len();
    let mut a = SparseMatrix::new(n);
    let mut b = vec![0.0; n];

    const NEIGHBORS: [(usize, i32, i32, i32); 6] = [
        (0, 1, 0, 0),
        (0, -1, 0, 0),
        (1, 0, 1, 0),
        (1, 0, -1, 0),
        (2, 0, 0, 1),
        (2, 0, 0, -1),
    ];

    for k in 0..shape.d {
        for j in 0..shape.h {
            for i in 0..shape.w {
                let idx = shape.linear_index(i, j, k);
                let Some(&row) = row_of.get(&idx) else { continue };

                let mut diag = 0.0;
                let mut divergence = 0.0;

                for &(dim, di, dj, dk) in &NEIGHBORS {
                    let (ni, nj, nk) = (i + di, j + dj, k + dk);
                    if shape.out_of_bounds(ni, nj, nk) {
                        continue;
                    }
                    // Face index: the face between (i,j,k) and (ni,nj,nk) on the positive
                    // side uses the larger of the two cell indices along `dim`.
                    let (fi, fj, fk) = if di > 0 || dj > 0 || dk > 0 { (ni, nj, nk) } else { (i, j, k) };
                    let a_face = area.get(dim, fi, fj, fk).unwrap_or(0.0);
                    let rho_face = density.get(dim, fi, fj, fk).unwrap_or(0.0);
                    if a_face <= 0.0 || rho_face <= 0.0 {
                        continue;
                    }
                    let coeff = dt * a_face / (dx * dx * rho_face);
                    diag += coeff;

                    let n_idx = shape.linear_index(ni, nj, nk);
                    if fluid[n_idx] < 0.0 {
                        if let Some(&ncol) = row_of.get(&n_idx) {
                            a.add_to_element(row, ncol, -coeff);
                        }
                    }

                    // Divergence RHS: +A*u on the high-side face, -A*u on the low-side face.
                    let u_face = velocity.get(dim, fi, fj, fk).unwrap_or(0.0);
                    let sign = if di > 0 || dj > 0 || dk > 0 { 1.0 } else { -1.0 };
                    divergence += sign * a_face * u_face / dx;
                }

                a.add_to_element(row, row, diag.max(1e-12));
                b[row] = divergence + rhs_bias;
            }
        }
    }

    let mut x = vec![0.0; n];
    let (report, diagnostic) = pcg::solve(&a, &b, &mut x, config);

    let mut pressure = vec![0.0; n_cells];
    for (&idx, &row) in row_of.iter() {
        pressure[idx] = x[row];
    }

    PressureResult { pressure, report, diagnostic }
}

/// Updates face velocities by the pressure gradient, clamping boundary faces (those with
/// zero area or zero density) to zero normal component (spec.md §4.6).
pub fn apply_gradient(shape: Shape3, dt: f64, pressure: &[f64], area: &MacArray<f64>, density: &MacArray<f64>, velocity: &mut MacArray<f64>) {
    let dx = shape.dx();
    for dim in 0..3 {
        let face_shape = shape.face(dim);
        for k in 0..face_shape.d {
            for j in 0..face_shape.h {
                for i in 0..face_shape.w {
                    let a_face = area.get(dim, i, j, k).unwrap_or(0.0);
                    let rho_face = density.get(dim, i, j, k).unwrap_or(0.0);
                    if a_face <= 0.0 || rho_face <= 0.0 {
                        velocity.set(dim, i, j, k, 0.0);
                        continue;
                    }
                    let mut lo = [i, j, k];
                    lo[dim] -= 1;
                    let p_hi = if shape.out_of_bounds(i, j, k) { 0.0 } else { pressure_at(shape, pressure, i, j, k) };
                    let p_lo = if shape.out_of_bounds(lo[0], lo[1], lo[2]) {
                        0.0
                    } else {
                        pressure_at(shape, pressure, lo[0], lo[1], lo[2])
                    };
                    if let Some(u) = velocity.get(dim, i, j, k) {
                        let grad = (p_hi - p_lo) / (rho_face * dx);
                        velocity.set(dim, i, j, k, u - dt * grad);
                    }
                }
            }
        }
    }
}

fn pressure_at(shape: Shape3, pressure: &[f64], i: i32, j: i32, k: i32) -> f64 {
    if shape.out_of_bounds(i, j, k) {
        0.0
    } else {
        pressure[shape.linear_index(i, j, k)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_system_is_a_noop() {
        let shape = Shape3::new(2, 2, 2);
        let fluid = vec![1.0; 8];
        let area = MacArray::<f64>::new(shape);
        let density = MacArray::<f64>::new(shape);
        let velocity = MacArray::<f64>::new(shape);
        let result = solve(shape, 0.01, &fluid, &area, &density, &velocity, 0.0, &PcgConfig::default());
        assert!(result.report.converged);
        assert!(result.pressure.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn volume_controller_zero_drift_gives_zero_bias() {
        let mut vc = VolumeController::default();
        let bias = vc.bias(1.0, 1.0, 1.0, 0.01);
        assert!(bias.abs() < 1e-9);
    }
}
