//! Preconditioned conjugate gradient for symmetric positive-(semi)definite systems
//! (spec §4.3).
//!
//! Grounded on `original_source/local/include/pcgsolver/blas_wrapper.h` and `RCMatrix.cpp`:
//! a modified-incomplete-Cholesky (MIC(0)) preconditioner, forward-then-backward
//! substitution each iteration, falling back to a plain Jacobi preconditioner when matrix
//! assembly leaves a zero pivot (non-fatal per spec.md §7.2 — `SolveError::DegeneratePreconditioner`
//! is logged, not propagated as failure).

use crate::error::SolveError;
use crate::matrix::sparse::SparseMatrix;

#[derive(Debug, Clone, Copy)]
pub struct PcgConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PcgConfig {
    fn default() -> Self {
        PcgConfig { max_iterations: 200, tolerance: 1e-6 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PcgReport {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
    pub used_fallback_preconditioner: bool,
}

/// Incomplete-Cholesky factor of a symmetric matrix's lower triangle, or a plain Jacobi
/// (diagonal) preconditioner on fallback.
enum Preconditioner {
    IncompleteCholesky { diag_inv: Vec<f64>, lower: SparseMatrix },
    Jacobi { diag_inv: Vec<f64> },
}

fn build_incomplete_cholesky(a: &SparseMatrix) -> Option<Preconditioner> {
    let n = a.len();
    let mut diag = vec![0.0f64; n];
    for i in 0..n {
        diag[i] = a.get(i, i);
    }
    // MIC(0): modify the diagonal by the sum of dropped off-diagonal fill, then factor only
    // the existing sparsity pattern (no new fill-in), matching `RCMatrix.cpp`'s in-place
    // incomplete factorization.
    let mut lower = SparseMatrix::new(n);
    for i in 0..n {
        let mut d = diag[i];
        for &(j, a_ij) in a.non_zeros(i) {
            if j >= i {
                continue;
            }
            let l_ij = a_ij / diag[j];
            lower.add_to_element(i, j, l_ij);
            d -= l_ij * l_ij * diag[j];
        }
        if d <= 1e-12 {
            return None;
        }
        diag[i] = d;
    }
    let diag_inv: Vec<f64> = diag.iter().map(|&d| 1.0 / d).collect();
    Some(Preconditioner::IncompleteCholesky { diag_inv, lower })
}

fn build_jacobi(a: &SparseMatrix) -> Preconditioner {
    let n = a.len();
    let diag_inv = (0..n)
        .map(|i| {
            let d = a.get(i, i);
            if d.abs() > 1e-12 {
                1.0 / d
            } else {
                1.0
            }
        })
        .collect();
    Preconditioner::Jacobi { diag_inv }
}

impl Preconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        match self {
            Preconditioner::Jacobi { diag_inv } => {
                for i in 0..r.len() {
                    z[i] = r[i] * diag_inv[i];
                }
            }
            Preconditioner::IncompleteCholesky { diag_inv, lower } => {
                let n = r.len();
                // Forward solve: (I + L) y = r, where `lower` holds the scaled L entries.
                let mut y = vec![0.0; n];
                for i in 0..n {
                    let mut acc = r[i];
                    for &(j, l_ij) in lower.non_zeros(i) {
                        acc -= l_ij * y[j];
                    }
                    y[i] = acc;
                }
                // Backward solve against the transpose, scaled by the factored diagonal.
                let upper = lower.transpose();
                for i in (0..n).rev() {
                    let mut acc = y[i] * diag_inv[i];
                    for &(j, l_ji) in upper.non_zeros(i) {
                        acc -= diag_inv[i] * l_ji * z[j];
                    }
                    z[i] = acc;
                }
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solves `a * x = b` in place on `x` (used as the initial guess), returning a diagnostic
/// report. Never fails fatally: an unconverged result is still the best-effort iterate
/// (spec.md §7.2).
pub fn solve(a: &SparseMatrix, b: &[f64], x: &mut [f64], config: &PcgConfig) -> (PcgReport, Option<SolveError>) {
    let n = a.len();
    if n == 0 {
        return (
            PcgReport { iterations: 0, residual: 0.0, converged: true, used_fallback_preconditioner: false },
            None,
        );
    }

    let (preconditioner, used_fallback) = match build_incomplete_cholesky(a) {
        Some(p) => (p, false),
        None => (build_jacobi(a), true),
    };
    let degeneracy_warning = if used_fallback { Some(SolveError::DegeneratePreconditioner) } else { None };

    let mut r = vec![0.0; n];
    a.multiply(x, &mut r);
    for i in 0..n {
        r[i] = b[i] - r[i];
    }

    let b_norm = b.iter().fold(0.0f64, |m, &v| m.max(v.abs())).max(1e-30);
    let mut residual = r.iter().fold(0.0f64, |m, &v| m.max(v.abs())) / b_norm;
    if residual < config.tolerance {
        return (
            PcgReport { iterations: 0, residual, converged: true, used_fallback_preconditioner: used_fallback },
            degeneracy_warning,
        );
    }

    let mut z = vec![0.0; n];
    preconditioner.apply(&r, &mut z);
    let mut p = z.clone();
    let mut rz_old = dot(&r, &z);

    let mut ap = vec![0.0; n];
    let mut iterations = 0;
    for iter in 0..config.max_iterations {
        iterations = iter + 1;
        a.multiply(&p, &mut ap);
        let pap = dot(&p, &ap);
        if pap.abs() < 1e-300 {
            break;
        }
        let alpha = rz_old / pap;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }
        residual = r.iter().fold(0.0f64, |m, &v| m.max(v.abs())) / b_norm;
        if residual < config.tolerance {
            break;
        }
        preconditioner.apply(&r, &mut z);
        let rz_new = dot(&r, &z);
        let beta = rz_new / rz_old;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
        rz_old = rz_new;
    }

    let converged = residual < config.tolerance;
    let report = PcgReport { iterations, residual, converged, used_fallback_preconditioner: used_fallback };
    let diagnostic = if !converged {
        Some(SolveError::PcgDidNotConverge { iterations, residual, tolerance: config.tolerance })
    } else {
        degeneracy_warning
    };
    (report, diagnostic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_diagonal_system_exactly() {
        let mut a = SparseMatrix::new(3);
        a.add_to_element(0, 0, 2.0);
        a.add_to_element(1, 1, 4.0);
        a.add_to_element(2, 2, 8.0);
        let b = [2.0, 8.0, 16.0];
        let mut x = [0.0; 3];
        let (report, diag) = solve(&a, &b, &mut x, &PcgConfig::default());
        assert!(report.converged, "diag = {:?}", diag);
        assert!((x[0] - 1.0).abs() < 1e-6);
        assert!((x[1] - 2.0).abs() < 1e-6);
        assert!((x[2] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn solves_1d_poisson_stencil() {
        let n = 5;
        let mut a = SparseMatrix::new(n);
        for i in 0..n {
            a.add_to_element(i, i, 2.0);
            if i > 0 {
                a.add_to_element(i, i - 1, -1.0);
            }
            if i + 1 < n {
                a.add_to_element(i, i + 1, -1.0);
            }
        }
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let (report, _) = solve(&a, &b, &mut x, &PcgConfig::default());
        assert!(report.converged);
        let mut check = vec![0.0; n];
        a.multiply(&x, &mut check);
        for i in 0..n {
            assert!((check[i] - b[i]).abs() < 1e-4);
        }
    }

    #[test]
    fn falls_back_to_jacobi_on_zero_pivot() {
        let mut a = SparseMatrix::new(2);
        a.add_to_element(0, 0, 0.0);
        a.add_to_element(1, 1, 1.0);
        let b = [0.0, 1.0];
        let mut x = [0.0; 2];
        let (report, diag) = solve(&a, &b, &mut x, &PcgConfig::default());
        assert!(report.used_fallback_preconditioner);
        assert!(matches!(diag, Some(SolveError::DegeneratePreconditioner)) || report.converged);
    }
}
