//! Row-compressed sparse matrix and preconditioned conjugate gradient (spec §4.3).

pub mod pcg;
pub mod sparse;

pub use pcg::{solve, PcgConfig, PcgReport};
pub use sparse::{FixedSparseMatrix, SparseMatrix};
