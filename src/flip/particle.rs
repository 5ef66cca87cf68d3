//! FLIP particle representation (spec §3 "FLIP particle").

use cgmath::{Vector3, Zero};

/// A single narrow-band FLIP particle. Invariants (enforced by [`Particle::collision`] and
/// the seeding/bullet logic in [`super::engine`]): `radius ∈ (0, 0.25*dx]`, `mass ∈ (0,
/// 0.25]`, bullets have `affine == 0` upon promotion.
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Affine velocity matrix columns, one per spatial axis (APIC).
    pub affine: [Vector3<f64>; 3],
    pub mass: f64,
    pub radius: f64,
    pub bullet: bool,
    pub bullet_time: f64,
    pub sizing_value: f64,
    pub live_count: u32,
}

impl Particle {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, mass: f64, radius: f64) -> Self {
        Particle {
            position,
            velocity,
            affine: [Vector3::zero(); 3],
            mass,
            radius,
            bullet: false,
            bullet_time: 0.0,
            sizing_value: 1.0,
            live_count: 0,
        }
    }

    /// Pushes the particle out of solid along the solid gradient and clamps it inside the
    /// unit domain by `radius` (spec.md §4.5 "After each advection, collision()...").
    pub fn collision<S>(&mut self, solid_at: S, domain_size: Vector3<f64>)
    where
        S: Fn(Vector3<f64>) -> (f64, Vector3<f64>),
    {
        let (phi, grad) = solid_at(self.position);
        if phi < self.radius {
            let push = self.radius - phi;
            self.position += grad * push;
        }
        for axis in 0..3 {
            let lo = self.radius;
            let hi = domain_size[axis] - self.radius;
            if self.position[axis] < lo {
                self.position[axis] = lo;
            } else if self.position[axis] > hi {
                self.position[axis] = hi;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_pushes_out_of_solid() {
        let mut p = Particle::new(Vector3::new(0.01, 0.5, 0.5), Vector3::zero(), 0.25, 0.02);
        p.collision(|_| (0.0, Vector3::new(1.0, 0.0, 0.0)), Vector3::new(1.0, 1.0, 1.0));
        assert!(p.position.x >= 0.02 - 1e-12);
    }

    #[test]
    fn collision_clamps_into_domain() {
        let mut p = Particle::new(Vector3::new(1.5, 0.5, 0.5), Vector3::zero(), 0.25, 0.02);
        p.collision(|_| (1.0, Vector3::new(0.0, 0.0, 0.0)), Vector3::new(1.0, 1.0, 1.0));
        assert!(p.position.x <= 1.0 - 0.02 + 1e-12);
    }
}
