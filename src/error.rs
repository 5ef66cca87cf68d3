//! Error kinds for the simulation core (spec §7).
//!
//! Configuration errors are fatal at configure time. Numerical degeneracy and boundary
//! violations are recoverable: they are reported through result types that carry a
//! diagnostic alongside the best-effort output, never through `panic!` or a bubbled `Err`
//! that aborts the step.

use thiserror::Error;

/// Unsupported configuration combinations, detected once at configure time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported Runge-Kutta order {0}, expected 1, 2, or 4")]
    UnsupportedRkOrder(u32),

    #[error("unsupported WENO order {0}, expected 4 or 6")]
    UnsupportedWenoOrder(u32),

    #[error("temporal adaptivity is not supported together with the Hachisuka forward-tracer strategy")]
    TemporalAdaptivityWithHachisuka,

    #[error("the accumulative BackwardFlip buffer requires temporal adaptivity to be enabled")]
    AccumulativeBufferWithoutTemporalAdaptivity,

    #[error("BackwardFlip max_velocity_layers ({max_velocity_layers}) must not exceed max_layers ({max_layers})")]
    VelocityLayerBudgetExceeded {
        max_layers: usize,
        max_velocity_layers: usize,
    },

    #[error("resolution must be nonzero in every dimension, got ({0}, {1}, {2})")]
    ZeroResolution(u32, u32, u32),
}

/// Non-fatal numerical degeneracy. Carries enough information for a caller to log and
/// continue with the best-effort result that was produced anyway.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("pressure solve did not reach target residual: {iterations} iterations, residual {residual:e} > tolerance {tolerance:e}")]
    PcgDidNotConverge {
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },

    #[error("fast-march redistancing stalled after {passes} passes with {unfixed} nodes still unfixed")]
    RedistanceStalled { passes: usize, unfixed: usize },

    #[error("pressure solve pivot was degenerate; fell back to Jacobi preconditioning")]
    DegeneratePreconditioner,
}
