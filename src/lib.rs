//! Shiokaze — a hybrid Eulerian/Lagrangian incompressible-flow core.
//!
//! This crate implements the staggered-grid / level-set / FLIP-particle simulation core
//! described in the project specification: grid algebra, level-set maintenance, advection
//! (semi-Lagrangian, MacCormack, WENO), a narrow-band FLIP particle engine, two projection
//! formulations (pressure Poisson and streamfunction/vector-potential), and a BackwardFlip
//! velocity-memory layer. Rendering, scene export, and UI are out of scope; see
//! [`scene::SceneDescription`] for the boundary between this core and an outer application.

#[macro_use]
extern crate log;

pub mod advection;
pub mod backwardflip;
pub mod config;
pub mod error;
pub mod flip;
pub mod grid;
pub mod levelset;
pub mod matrix;
pub mod parallel;
pub mod projection;
pub mod scene;
pub mod solver;

pub use config::Config;
pub use error::{ConfigError, SolveError};
pub use scene::SceneDescription;
pub use solver::Solver;
