//! Pressure-Poisson and streamfunction/vector-potential projection (spec §4.6, §4.7).

pub mod pressure;
pub mod streamfunction;

pub use pressure::{solve as solve_pressure, PressureResult, VolumeController};
pub use streamfunction::{precompute as precompute_streamfunction, solve as solve_streamfunction, Operators, StreamfunctionResult};
