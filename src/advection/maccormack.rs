//! MacCormack advection with narrow-band clamp fallback (spec §4.4).
//!
//! Grounded on spec.md §4.4 and `original_source/src/advection/macadvection3.cpp`: forward
//! advect, backward advect with reversed time, correct by half the forward/backward error,
//! then clamp to the local forward-trace stencil min/max; within `trim_narrowband * dx` of
//! the surface, fall back to the uncorrected forward estimate to suppress overshoot near
//! ballistic features.

/// Result of a single MacCormack step for one sample.
pub struct MacCormackResult {
    pub value: f64,
    pub clamped: bool,
}

/// Combines a forward estimate `q0`, the input value `q_in`, and a backward re-advection of
/// `q0` (`q1`) into the corrected estimate, clamped to `[stencil_min, stencil_max]`.
///
/// `near_surface` selects the narrow-band trim fallback (spec.md §4.4): within
/// `trim_narrowband` cells of the interface, the correction is skipped entirely and `q0` is
/// returned as-is.
pub fn correct(q0: f64, q_in: f64, q1: f64, stencil_min: f64, stencil_max: f64, near_surface: bool) -> MacCormackResult {
    if near_surface {
        return MacCormackResult { value: q0, clamped: false };
    }
    let q_out = q0 + 0.5 * (q_in - q1);
    if q_out < stencil_min || q_out > stencil_max {
        MacCormackResult { value: q_out.clamp(stencil_min, stencil_max), clamped: true }
    } else {
        MacCormackResult { value: q_out, clamped: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_backtrace_leaves_value_unchanged() {
        // If q1 reconstructs q_in exactly, the correction term vanishes.
        let r = correct(1.0, 2.0, 2.0, 0.0, 3.0, false);
        assert!((r.value - 1.0).abs() < 1e-12);
        assert!(!r.clamped);
    }

    #[test]
    fn overshoot_is_clamped_to_stencil_range() {
        let r = correct(1.0, 5.0, 0.0, 0.0, 2.0, false);
        assert!(r.clamped);
        assert!(r.value <= 2.0 + 1e-12);
    }

    #[test]
    fn near_surface_skips_correction() {
        let r = correct(1.0, 5.0, 0.0, 0.0, 2.0, true);
        assert_eq!(r.value, 1.0);
        assert!(!r.clamped);
    }
}
