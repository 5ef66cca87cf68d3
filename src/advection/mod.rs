//! Advection schemes: semi-Lagrangian back-trace, MacCormack correction, and WENO
//! interpolation (spec §4.4).

pub mod field;
pub mod maccormack;
pub mod semi_lagrangian;
pub mod weno;

pub use field::{advect_cell_scalar, advect_mac_axis};
pub use maccormack::{correct as maccormack_correct, MacCormackResult};
pub use semi_lagrangian::{advect_sample, back_trace, Interpolation};
