//! Simulation configuration surface (spec §6, "Configuration surface").
//!
//! `blub` has no structured config equivalent — its parameters are baked into shader UBOs —
//! so this mirrors the pack's config-carrying crates instead (`oxidized`'s `core-config`,
//! `lisal`'s `config.rs`): a flat `serde`-deserializable struct with one field per option
//! and `#[serde(default = ...)]` matching the table in spec.md §6.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Order of the Runge-Kutta particle-advection integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RkOrder {
    One = 1,
    Two = 2,
    Four = 4,
}

impl RkOrder {
    pub fn stages(self) -> u32 {
        self as u32
    }
}

/// Order of WENO interpolation, when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WenoOrder {
    Four = 4,
    Six = 6,
}

fn default_resolution_x() -> u32 {
    64
}
fn default_resolution_y() -> u32 {
    32
}
fn default_resolution_z() -> u32 {
    64
}
fn default_resolution_scale() -> f64 {
    1.0
}
fn default_gravity() -> [f64; 3] {
    [0.0, -9.8, 0.0]
}
fn default_true() -> bool {
    true
}
fn default_volume_change_tol_ratio() -> f64 {
    0.03
}
fn default_correction_gain() -> f64 {
    1.0
}
fn default_surface_tension() -> f64 {
    0.0
}
fn default_picflip() -> f64 {
    0.95
}
fn default_rk_order() -> RkOrder {
    RkOrder::Two
}
fn default_narrowband() -> u32 {
    3
}
fn default_particles_per_cell() -> u32 {
    6
}
fn default_erosion() -> f64 {
    0.5
}
fn default_bullet_maximal_time() -> f64 {
    0.5
}
fn default_bf_max_layer() -> usize {
    8
}
fn default_bf_decay_rate() -> f64 {
    0.9
}
fn default_weno_order() -> WenoOrder {
    WenoOrder::Six
}
fn default_trim_narrowband() -> u32 {
    1
}

/// Flat configuration record threaded through the solver; see spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_resolution_x")]
    pub resolution_x: u32,
    #[serde(default = "default_resolution_y")]
    pub resolution_y: u32,
    #[serde(default = "default_resolution_z")]
    pub resolution_z: u32,
    #[serde(default = "default_resolution_scale")]
    pub resolution_scale: f64,
    #[serde(default = "default_gravity")]
    pub gravity: [f64; 3],
    #[serde(default = "default_true")]
    pub volume_correction: bool,
    #[serde(default = "default_volume_change_tol_ratio")]
    pub volume_change_tol_ratio: f64,
    #[serde(default = "default_correction_gain")]
    pub correction_gain: f64,
    #[serde(default = "default_surface_tension")]
    pub surface_tension: f64,
    #[serde(default = "default_true")]
    pub apic: bool,
    #[serde(default = "default_picflip")]
    pub picflip: f64,
    #[serde(default = "default_rk_order")]
    pub rk_order: RkOrder,
    #[serde(default = "default_narrowband")]
    pub narrowband: u32,
    #[serde(default = "default_particles_per_cell")]
    pub max_particles_per_cell: u32,
    #[serde(default = "default_particles_per_cell")]
    pub min_particles_per_cell: u32,
    #[serde(default = "default_erosion")]
    pub erosion: f64,
    #[serde(default = "default_bullet_maximal_time")]
    pub bullet_maximal_time: f64,
    #[serde(default = "default_true")]
    pub diff_solve: bool,
    #[serde(default = "default_bf_max_layer")]
    pub bf_max_layer: usize,
    #[serde(default = "default_bf_max_layer")]
    pub bf_max_vel_layer: usize,
    #[serde(default = "default_bf_decay_rate")]
    pub bf_decay_rate: f64,
    #[serde(default = "default_true")]
    pub maccormack: bool,
    #[serde(default)]
    pub weno: bool,
    #[serde(default = "default_weno_order")]
    pub weno_order: WenoOrder,
    #[serde(default = "default_trim_narrowband")]
    pub trim_narrowband: u32,

    /// Use the Hachisuka forward-tracer BackwardFlip strategy instead of the backtrace one.
    #[serde(default)]
    pub backwardflip_hachisuka: bool,
    /// Coalesce `step` deque layers adaptively based on local velocity magnitude.
    #[serde(default)]
    pub temporal_adaptivity: bool,
    /// Disable tracker particles in slow, low-density cells.
    #[serde(default)]
    pub spatial_adaptivity: bool,
    /// Reuse the accumulative front-sum buffer (requires `temporal_adaptivity`).
    #[serde(default)]
    pub accumulative_buffer: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            resolution_x: default_resolution_x(),
            resolution_y: default_resolution_y(),
            resolution_z: default_resolution_z(),
            resolution_scale: default_resolution_scale(),
            gravity: default_gravity(),
            volume_correction: true,
            volume_change_tol_ratio: default_volume_change_tol_ratio(),
            correction_gain: default_correction_gain(),
            surface_tension: default_surface_tension(),
            apic: true,
            picflip: default_picflip(),
            rk_order: default_rk_order(),
            narrowband: default_narrowband(),
            max_particles_per_cell: default_particles_per_cell(),
            min_particles_per_cell: default_particles_per_cell(),
            erosion: default_erosion(),
            bullet_maximal_time: default_bullet_maximal_time(),
            diff_solve: true,
            bf_max_layer: default_bf_max_layer(),
            bf_max_vel_layer: default_bf_max_layer(),
            bf_decay_rate: default_bf_decay_rate(),
            maccormack: true,
            weno: false,
            weno_order: default_weno_order(),
            trim_narrowband: default_trim_narrowband(),
            backwardflip_hachisuka: false,
            temporal_adaptivity: false,
            spatial_adaptivity: false,
            accumulative_buffer: false,
        }
    }
}

impl Config {
    /// Validate configuration-time constraints from spec.md §7.1. Fatal — called once
    /// before the solver is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution_x == 0 || self.resolution_y == 0 || self.resolution_z == 0 {
            return Err(ConfigError::ZeroResolution(self.resolution_x, self.resolution_y, self.resolution_z));
        }
        if !matches!(self.rk_order, RkOrder::One | RkOrder::Two | RkOrder::Four) {
            return Err(ConfigError::UnsupportedRkOrder(self.rk_order as u32));
        }
        if self.weno && !matches!(self.weno_order, WenoOrder::Four | WenoOrder::Six) {
            return Err(ConfigError::UnsupportedWenoOrder(self.weno_order as u32));
        }
        if self.temporal_adaptivity && self.backwardflip_hachisuka {
            return Err(ConfigError::TemporalAdaptivityWithHachisuka);
        }
        if self.accumulative_buffer && !self.temporal_adaptivity {
            return Err(ConfigError::AccumulativeBufferWithoutTemporalAdaptivity);
        }
        if self.bf_max_vel_layer > self.bf_max_layer {
            return Err(ConfigError::VelocityLayerBudgetExceeded {
                max_layers: self.bf_max_layer,
                max_velocity_layers: self.bf_max_vel_layer,
            });
        }
        Ok(())
    }

    pub fn gravity_vec(&self) -> cgmath::Vector3<f64> {
        cgmath::Vector3::new(self.gravity[0], self.gravity[1], self.gravity[2])
    }

    pub fn parse_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_hachisuka_with_temporal_adaptivity() {
        let mut cfg = Config::default();
        cfg.temporal_adaptivity = true;
        cfg.backwardflip_hachisuka = true;
        assert_eq!(cfg.validate(), Err(ConfigError::TemporalAdaptivityWithHachisuka));
    }

    #[test]
    fn rejects_accumulative_without_temporal_adaptivity() {
        let mut cfg = Config::default();
        cfg.accumulative_buffer = true;
        assert_eq!(cfg.validate(), Err(ConfigError::AccumulativeBufferWithoutTemporalAdaptivity));
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"ResolutionX": 128}"#.replace("ResolutionX", "resolution_x").as_str()).unwrap();
        assert_eq!(cfg.resolution_x, 128);
        assert_eq!(cfg.resolution_y, 32);
    }
}
