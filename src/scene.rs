//! Scene initial conditions and step source hook (spec §6 "External Interfaces").
//!
//! Grounded on `original_source`'s `dlsym`-based scene plugin lookups (`velocity`, `solid`,
//! `fluid`, `density`, `add`), expressed here as an ordinary Rust struct of optional boxed
//! closures rather than dynamic symbol resolution — the plugin host itself is out of scope
//! (spec.md §9, "the plugin host itself is not part of the core").

use cgmath::{Vector3, Zero};

type VelocityFn = dyn Fn(Vector3<f64>) -> Vector3<f64> + Sync + Send;
type ScalarFn = dyn Fn(Vector3<f64>) -> f64 + Sync + Send;
type AddFn = dyn Fn(Vector3<f64>, &mut Vector3<f64>, &mut f64, f64, f64) + Sync + Send;

/// Initial-condition callbacks plus a per-step source hook, selected by `name` (spec.md §6).
/// Missing callbacks default to zero/one-infinity as appropriate: `velocity` to zero,
/// `solid`/`fluid` to `+infinity` (no solid, no fluid present), `density` to zero.
#[derive(Default)]
pub struct SceneDescription {
    pub name: String,
    velocity: Option<Box<VelocityFn>>,
    solid: Option<Box<ScalarFn>>,
    fluid: Option<Box<ScalarFn>>,
    density: Option<Box<ScalarFn>>,
    add: Option<Box<AddFn>>,
}

impl SceneDescription {
    pub fn new(name: impl Into<String>) -> Self {
        SceneDescription { name: name.into(), ..Default::default() }
    }

    pub fn with_velocity<F>(mut self, f: F) -> Self
    where
        F: Fn(Vector3<f64>) -> Vector3<f64> + Sync + Send + 'static,
    {
        self.velocity = Some(Box::new(f));
        self
    }

    pub fn with_solid<F>(mut self, f: F) -> Self
    where
        F: Fn(Vector3<f64>) -> f64 + Sync + Send + 'static,
    {
        self.solid = Some(Box::new(f));
        self
    }

    pub fn with_fluid<F>(mut self, f: F) -> Self
    where
        F: Fn(Vector3<f64>) -> f64 + Sync + Send + 'static,
    {
        self.fluid = Some(Box::new(f));
        self
    }

    pub fn with_density<F>(mut self, f: F) -> Self
    where
        F: Fn(Vector3<f64>) -> f64 + Sync + Send + 'static,
    {
        self.density = Some(Box::new(f));
        self
    }

    pub fn with_add<F>(mut self, f: F) -> Self
    where
        F: Fn(Vector3<f64>, &mut Vector3<f64>, &mut f64, f64, f64) + Sync + Send + 'static,
    {
        self.add = Some(Box::new(f));
        self
    }

    pub fn velocity_at(&self, p: Vector3<f64>) -> Vector3<f64> {
        self.velocity.as_ref().map(|f| f(p)).unwrap_or_else(Vector3::zero)
    }

    pub fn solid_at(&self, p: Vector3<f64>) -> f64 {
        self.solid.as_ref().map(|f| f(p)).unwrap_or(f64::INFINITY)
    }

    pub fn fluid_at(&self, p: Vector3<f64>) -> f64 {
        self.fluid.as_ref().map(|f| f(p)).unwrap_or(f64::INFINITY)
    }

    pub fn density_at(&self, p: Vector3<f64>) -> f64 {
        self.density.as_ref().map(|f| f(p)).unwrap_or(0.0)
    }

    /// Injects velocity/density sources at a world position, mutating the passed-in face
    /// velocity and cell density values in place (spec.md §6, "Step source hook").
    pub fn add(&self, p: Vector3<f64>, u: &mut Vector3<f64>, d: &mut f64, time: f64, dt: f64) {
        if let Some(f) = &self.add {
            f(p, u, d, time, dt);
        }
    }

    pub fn has_add(&self) -> bool {
        self.add.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_callbacks_use_documented_defaults() {
        let scene = SceneDescription::new("empty");
        assert_eq!(scene.velocity_at(Vector3::zero()), Vector3::zero());
        assert_eq!(scene.solid_at(Vector3::zero()), f64::INFINITY);
        assert_eq!(scene.fluid_at(Vector3::zero()), f64::INFINITY);
        assert_eq!(scene.density_at(Vector3::zero()), 0.0);
    }

    #[test]
    fn configured_callbacks_override_defaults() {
        let scene = SceneDescription::new("half_filled").with_fluid(|p| p.y - 0.5).with_solid(|_| 1.0);
        assert!(scene.fluid_at(Vector3::new(0.0, 0.25, 0.0)) < 0.0);
        assert_eq!(scene.solid_at(Vector3::zero()), 1.0);
    }

    #[test]
    fn add_hook_mutates_in_place() {
        let scene = SceneDescription::new("source").with_add(|_p, u, d, _time, dt| {
            u.y += 1.0 * dt;
            *d += 0.5;
        });
        let mut u = Vector3::zero();
        let mut d = 0.0;
        scene.add(Vector3::zero(), &mut u, &mut d, 0.0, 0.1);
        assert!((u.y - 0.1).abs() < 1e-12);
        assert!((d - 0.5).abs() < 1e-12);
    }
}
