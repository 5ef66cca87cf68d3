//! Narrow-band FLIP particle engine (spec §4.5).

pub mod engine;
pub mod particle;

pub use engine::Engine;
pub use particle::Particle;
