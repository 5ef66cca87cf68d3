//! Top-level per-step orchestration (spec §2 "System Overview", §4).
//!
//! Grounded on `blub::simulation_controller::SimulationController::single_step` for the
//! shape of a "do one step" driver and `blub::hybrid_fluid::HybridFluid::step` for the
//! ordered stages this crate fills in: transfer to grid, apply forces, resolve, transfer to
//! particles, advect. The exact stage order is spec.md §2's pipeline:
//! advect level set -> advect particles (and collide) -> rebuild level set & redistance ->
//! advect face velocity -> splat -> combine -> body forces -> projection -> extend narrow
//! band -> update particle velocities (PIC/FLIP/APIC) -> classify bullets -> correct ->
//! decay sizing.

use cgmath::{InnerSpace, Vector3, Zero};

use crate::advection::field::{advect_cell_scalar, advect_mac_axis};
use crate::config::Config;
use crate::error::ConfigError;
use crate::flip::Engine;
use crate::grid::fraction::{compute_area_fraction, compute_fluid_fraction};
use crate::grid::mac_array::MacArray;
use crate::grid::shape::Shape3;
use crate::levelset::marching_cubes::get_cell_volume;
use crate::levelset::redistancer::{fastmarch, Graph, GraphNode};
use crate::levelset::util::{combine_levelset, extrapolate_levelset, mark_narrowband};
use crate::matrix::pcg::PcgConfig;
use crate::projection::pressure::{self, VolumeController};
use crate::scene::SceneDescription;

const NEIGHBORS6: [(i32, i32, i32); 6] = [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)];

/// Default solid/fluid fraction clamp (spec.md §3, "Clamped below by eps_fluid, eps_solid
/// (default 1e-2) when nonzero").
const EPS_FRACTION: f64 = 1e-2;

/// Trilinearly samples a cell-centered dense scalar field at a world position, clamping out
/// of range indices to the domain (spec.md §3, "a cell center at index i lives at dx*(i +
/// 0.5)").
fn sample_cell_scalar(shape: Shape3, values: &[f64], p: Vector3<f64>) -> f64 {
    let dx = shape.dx();
    let local = Vector3::new(p.x / dx - 0.5, p.y / dx - 0.5, p.z / dx - 0.5);
    trilerp(local, |i, j, k| {
        let (ci, cj, ck) = shape.clamp(i, j, k);
        values[shape.linear_index(ci, cj, ck)]
    })
}

/// Trilinearly samples one axis of a [`MacArray`] velocity/area/density field at a world
/// position, treating unset (off) faces as zero.
fn sample_face(mac: &MacArray<f64>, dim: usize, dx: f64, p: Vector3<f64>) -> f64 {
    let face_shape = mac.axis(dim).shape();
    let offset = Vector3::new(
        if dim == 0 { 0.0 } else { 0.5 },
        if dim == 1 { 0.0 } else { 0.5 },
        if dim == 2 { 0.0 } else { 0.5 },
    );
    let local = Vector3::new(p.x / dx - offset.x, p.y / dx - offset.y, p.z / dx - offset.z);
    trilerp(local, |i, j, k| {
        let (ci, cj, ck) = face_shape.clamp(i, j, k);
        mac.get(dim, ci, cj, ck).unwrap_or(0.0)
    })
}

fn sample_velocity(mac: &MacArray<f64>, dx: f64, p: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(sample_face(mac, 0, dx, p), sample_face(mac, 1, dx, p), sample_face(mac, 2, dx, p))
}

fn trilerp<F: Fn(i32, i32, i32) -> f64>(local: Vector3<f64>, get: F) -> f64 {
    let i0 = local.x.floor() as i32;
    let j0 = local.y.floor() as i32;
    let k0 = local.z.floor() as i32;
    let (fx, fy, fz) = (local.x - i0 as f64, local.y - j0 as f64, local.z - k0 as f64);

    let c00 = get(i0, j0, k0) * (1.0 - fx) + get(i0 + 1, j0, k0) * fx;
    let c10 = get(i0, j0 + 1, k0) * (1.0 - fx) + get(i0 + 1, j0 + 1, k0) * fx;
    let c01 = get(i0, j0, k0 + 1) * (1.0 - fx) + get(i0 + 1, j0, k0 + 1) * fx;
    let c11 = get(i0, j0 + 1, k0 + 1) * (1.0 - fx) + get(i0 + 1, j0 + 1, k0 + 1) * fx;

    let c0 = c00 * (1.0 - fy) + c10 * fy;
    let c1 = c01 * (1.0 - fy) + c11 * fy;
    c0 * (1.0 - fz) + c1 * fz
}

/// Central-difference gradient of a cell-centered level set at a grid index, clamped at
/// the domain boundary.
fn gradient_at(shape: Shape3, fluid: &[f64], i: i32, j: i32, k: i32) -> Vector3<f64> {
    let dx = shape.dx();
    let get = |di: i32, dj: i32, dk: i32| {
        let (ci, cj, ck) = shape.clamp(i + di, j + dj, k + dk);
        fluid[shape.linear_index(ci, cj, ck)]
    };
    Vector3::new(
        (get(1, 0, 0) - get(-1, 0, 0)) / (2.0 * dx),
        (get(0, 1, 0) - get(0, -1, 0)) / (2.0 * dx),
        (get(0, 0, 1) - get(0, 0, -1)) / (2.0 * dx),
    )
}

fn normal_at(shape: Shape3, fluid: &[f64], i: i32, j: i32, k: i32) -> Vector3<f64> {
    let g = gradient_at(shape, fluid, i, j, k);
    let n = g.magnitude();
    if n > 1e-9 {
        g / n
    } else {
        Vector3::zero()
    }
}

/// Central-difference gradient of a cell-centered level set at a world position, used by
/// [`Engine::correct`]'s enclosed-volume guard (spec.md §4.5 "Correction").
fn fluid_gradient_impl(shape: Shape3, fluid: &[f64], p: Vector3<f64>) -> Vector3<f64> {
    let dx = shape.dx();
    let h = 0.5 * dx;
    let f = |q: Vector3<f64>| sample_cell_scalar(shape, fluid, q);
    Vector3::new(
        (f(p + Vector3::new(h, 0.0, 0.0)) - f(p - Vector3::new(h, 0.0, 0.0))) / dx,
        (f(p + Vector3::new(0.0, h, 0.0)) - f(p - Vector3::new(0.0, h, 0.0))) / dx,
        (f(p + Vector3::new(0.0, 0.0, h)) - f(p - Vector3::new(0.0, 0.0, h))) / dx,
    )
}

/// Mean curvature of the level set at a cell, via the divergence of its unit normal.
fn curvature_at(shape: Shape3, fluid: &[f64], i: i32, j: i32, k: i32) -> f64 {
    let dx = shape.dx();
    let nx_p = normal_at(shape, fluid, i + 1, j, k);
    let nx_m = normal_at(shape, fluid, i - 1, j, k);
    let ny_p = normal_at(shape, fluid, i, j + 1, k);
    let ny_m = normal_at(shape, fluid, i, j - 1, k);
    let nz_p = normal_at(shape, fluid, i, j, k + 1);
    let nz_m = normal_at(shape, fluid, i, j, k - 1);
    (nx_p.x - nx_m.x) / (2.0 * dx) + (ny_p.y - ny_m.y) / (2.0 * dx) + (nz_p.z - nz_m.z) / (2.0 * dx)
}

/// The simulation core: owns grid state, the FLIP particle engine, and per-step scratch
/// buffers, and drives them through the spec.md §2 pipeline once per [`Solver::step`] call.
pub struct Solver {
    config: Config,
    scene: SceneDescription,
    shape: Shape3,
    time: f64,
    velocity: MacArray<f64>,
    fluid: Vec<f64>,
    solid: Vec<f64>,
    solid_nodal: Vec<f64>,
    engine: Engine,
    volume_controller: VolumeController,
    target_volume: Option<f64>,
    pcg_config: PcgConfig,
}

impl Solver {
    pub fn new(config: Config, scene: SceneDescription) -> Result<Self, ConfigError> {
        config.validate()?;

        let shape = Shape3::new(
            (config.resolution_x as f64 * config.resolution_scale).round() as i32,
            (config.resolution_y as f64 * config.resolution_scale).round() as i32,
            (config.resolution_z as f64 * config.resolution_scale).round() as i32,
        );
        let n_cells = shape.count() as usize;
        let n_nodes = shape.nodal().count() as usize;

        let mut velocity = MacArray::<f64>::new(shape);
        for dim in 0..3 {
            let face_shape = shape.face(dim);
            for k in 0..face_shape.d {
                for j in 0..face_shape.h {
                    for i in 0..face_shape.w {
                        let p = shape.face_center(dim, i, j, k);
                        velocity.set(dim, i, j, k, scene.velocity_at(p)[dim]);
                    }
                }
            }
        }

        let mut fluid = vec![0.0; n_cells];
        let mut solid = vec![0.0; n_cells];
        for k in 0..shape.d {
            for j in 0..shape.h {
                for i in 0..shape.w {
                    let idx = shape.linear_index(i, j, k);
                    let p = shape.cell_center(i, j, k);
                    fluid[idx] = scene.fluid_at(p);
                    solid[idx] = scene.solid_at(p);
                }
            }
        }

        let nodal_shape = shape.nodal();
        let mut solid_nodal = vec![0.0; n_nodes];
        for k in 0..nodal_shape.d {
            for j in 0..nodal_shape.h {
                for i in 0..nodal_shape.w {
                    let idx = nodal_shape.linear_index(i, j, k);
                    solid_nodal[idx] = scene.solid_at(shape.node_center(i, j, k));
                }
            }
        }

        let mut engine = Engine::new(shape, 0xF1A7);
        engine.seed(config.min_particles_per_cell, |i, j, k| -fluid[shape.linear_index(i, j, k)], |p| scene.solid_at(p));

        info!(
            "solver initialized: shape {}x{}x{}, {} particles seeded",
            shape.w,
            shape.h,
            shape.d,
            engine.particles.len()
        );

        Ok(Solver {
            config,
            scene,
            shape,
            time: 0.0,
            velocity,
            fluid,
            solid,
            solid_nodal,
            engine,
            volume_controller: VolumeController::default(),
            target_volume: None,
            pcg_config: PcgConfig::default(),
        })
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn particle_count(&self) -> usize {
        self.engine.particles.len()
    }

    pub fn fluid_levelset(&self) -> &[f64] {
        &self.fluid
    }

    pub fn velocity(&self) -> &MacArray<f64> {
        &self.velocity
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    /// Total fluid volume via marching-cubes cell volumes over the nodal-sampled level set
    /// (spec.md §4.1 `get_cell_volume`, used by §4.6's volume controller).
    pub fn fluid_volume(&self) -> f64 {
        self.total_fluid_volume()
    }

    /// Advances the simulation by `dt`, running the full spec.md §2 pipeline once.
    pub fn step(&mut self, dt: f64) {
        let shape = self.shape;
        let dx = shape.dx();

        self.advect_level_set(dt);
        let rk_stages = self.config.rk_order.stages();
        let velocity = &self.velocity;
        self.engine.advect(dt, rk_stages, |p| sample_velocity(velocity, dx, p));
        self.collide_particles();
        self.rebuild_level_set_and_redistance();

        let velocity_advected = self.advect_face_velocity(dt);
        let (velocity_particles, mass_accum) = self.splat_particles();
        let mut velocity_combined = MacArray::<f64>::new(shape);
        for dim in 0..3 {
            let face_shape = shape.face(dim);
            for k in 0..face_shape.d {
                for j in 0..face_shape.h {
                    for i in 0..face_shape.w {
                        let v = if mass_accum.active(dim, i, j, k) {
                            velocity_particles.get(dim, i, j, k).unwrap_or(0.0)
                        } else {
                            velocity_advected.get(dim, i, j, k).unwrap_or(0.0)
                        };
                        velocity_combined.set(dim, i, j, k, v);
                    }
                }
            }
        }
        self.velocity = velocity_combined;
        let velocity_pre_force = self.snapshot_velocity();

        self.add_body_forces(dt);
        self.project(dt);
        self.extend_narrowband();

        let velocity_new = self.snapshot_velocity();
        let gravity = self.config.gravity_vec();
        let bullet_maximal_time = self.config.bullet_maximal_time;
        let erosion = self.config.erosion;
        let time = self.time;
        let fluid = &self.fluid;
        self.engine.update_velocities(
            &self.config,
            gravity,
            dt,
            |p| sample_velocity(&velocity_new, dx, p),
            |p| sample_velocity(&velocity_pre_force, dx, p),
            |p| apic_affine(&velocity_new, dx, p),
        );
        self.engine.classify_bullets(
            |p| sample_cell_scalar(shape, fluid, p),
            |p| sample_velocity(&velocity_new, dx, p),
            time,
            dt,
            bullet_maximal_time,
        );
        self.engine.correct(0.5, |p| fluid_gradient_impl(shape, fluid, p));
        self.engine.decay_sizing(erosion, dt);

        self.time += dt;
        trace!("step complete: t={:.5}, {} particles", self.time, self.engine.particles.len());
    }

    fn snapshot_velocity(&self) -> MacArray<f64> {
        let mut out = MacArray::<f64>::new(self.shape);
        for dim in 0..3 {
            let face_shape = self.shape.face(dim);
            for k in 0..face_shape.d {
                for j in 0..face_shape.h {
                    for i in 0..face_shape.w {
                        if let Some(v) = self.velocity.get(dim, i, j, k) {
                            out.set(dim, i, j, k, v);
                        }
                    }
                }
            }
        }
        out
    }

    /// Back-traces and re-samples every cell of the fluid level set through the current
    /// velocity field (spec.md §2, pipeline stage 1).
    fn advect_level_set(&mut self, dt: f64) {
        let shape = self.shape;
        let dx = shape.dx();
        let trim_band = self.config.trim_narrowband as f64 * dx;
        let velocity = &self.velocity;
        let config = &self.config;
        let fluid = &self.fluid;
        let near_surface_at = |p: Vector3<f64>| sample_cell_scalar(shape, fluid, p).abs() < trim_band;

        let advected = advect_cell_scalar(
            shape,
            dt,
            fluid,
            &|p| sample_velocity(velocity, dx, p),
            config,
            |i, j, k| near_surface_at(shape.cell_center(i, j, k)),
        );
        self.fluid = combine_levelset(shape, &self.solid, &advected);
    }

    /// Pushes every particle out of solid along the solid gradient (spec.md §4.5, "After
    /// each advection, collision()...").
    fn collide_particles(&mut self) {
        let dx = self.shape.dx();
        let scene = &self.scene;
        self.engine.collide(|p| {
            let h = 0.5 * dx;
            let phi = scene.solid_at(p);
            let grad = Vector3::new(
                (scene.solid_at(p + Vector3::new(h, 0.0, 0.0)) - scene.solid_at(p - Vector3::new(h, 0.0, 0.0))) / dx,
                (scene.solid_at(p + Vector3::new(0.0, h, 0.0)) - scene.solid_at(p - Vector3::new(0.0, h, 0.0))) / dx,
                (scene.solid_at(p + Vector3::new(0.0, 0.0, h)) - scene.solid_at(p - Vector3::new(0.0, 0.0, h))) / dx,
            );
            let norm = grad.magnitude();
            let normal = if norm > 1e-9 { grad / norm } else { Vector3::new(0.0, 1.0, 0.0) };
            (phi, normal)
        });
    }

    /// Rebuilds the fluid level set from particle positions (blended against the grid-
    /// advected level set by the sizing-function weight) and redistances it (spec.md §2,
    /// pipeline stage 3; §4.2 "Fast-march redistancer").
    fn rebuild_level_set_and_redistance(&mut self) {
        let particle_levelset = self.engine.particle_levelset(&self.fluid);
        self.fluid = combine_levelset(self.shape, &self.solid, &particle_levelset);
        self.redistance_levelset();
    }

    /// Extends `|phi|` outward from the zero-crossing band via [`fastmarch`] over a
    /// cell-grid graph, then clamps to the required narrow-band width (spec.md §3
    /// "Levelset invariants", (ii): "narrow band width >= CFL + 1 cells").
    fn redistance_levelset(&mut self) {
        let shape = self.shape;
        let dx = shape.dx();
        let band = mark_narrowband(shape, &self.fluid, 1);

        let n = shape.count() as usize;
        let mut graph = Graph::new(n);
        for k in 0..shape.d {
            for j in 0..shape.h {
                for i in 0..shape.w {
                    let idx = shape.linear_index(i, j, k);
                    graph.nodes.push(GraphNode {
                        position: shape.cell_center(i, j, k),
                        levelset: self.fluid[idx],
                        fixed: band.active(i, j, k),
                    });
                    let mut conns = Vec::with_capacity(6);
                    for &(di, dj, dk) in &NEIGHBORS6 {
                        let (ni, nj, nk) = (i + di, j + dj, k + dk);
                        if !shape.out_of_bounds(ni, nj, nk) {
                            conns.push(shape.linear_index(ni, nj, nk));
                        }
                    }
                    graph.connections.push(conns);
                }
            }
        }

        if graph.nodes.iter().any(|node| node.fixed) {
            if let Err(err) = fastmarch(&mut graph) {
                warn!("fast-march redistancing did not fully converge: {}", err);
            }
        }

        let band_width = (self.config.narrowband as f64 + 1.0) * dx;
        for k in 0..shape.d {
            for j in 0..shape.h {
                for i in 0..shape.w {
                    let idx = shape.linear_index(i, j, k);
                    self.fluid[idx] = graph.nodes[idx].levelset.clamp(-band_width, band_width);
                }
            }
        }

        self.fluid = combine_levelset(shape, &self.solid, &self.fluid);
    }

    /// Advects every face component of the velocity field (spec.md §2, pipeline stage 4).
    fn advect_face_velocity(&mut self, dt: f64) -> MacArray<f64> {
        let shape = self.shape;
        let dx = shape.dx();
        let trim_band = self.config.trim_narrowband as f64 * dx;
        let velocity = &self.velocity;
        let config = &self.config;
        let fluid = &self.fluid;
        let near_surface_at = |p: Vector3<f64>| sample_cell_scalar(shape, fluid, p).abs() < trim_band;

        let mut out = MacArray::<f64>::new(shape);
        for dim in 0..3 {
            let advected_axis = advect_mac_axis(
                shape,
                dim,
                dt,
                velocity,
                &|p| sample_velocity(velocity, dx, p),
                config,
                |i, j, k| near_surface_at(shape.face_center(dim, i, j, k)),
            );
            let face_shape = shape.face(dim);
            for k in 0..face_shape.d {
                for j in 0..face_shape.h {
                    for i in 0..face_shape.w {
                        if let Some(v) = advected_axis.get(dim, i, j, k) {
                            out.set(dim, i, j, k, v);
                        }
                    }
                }
            }
        }
        out
    }

    /// Splats particle momentum onto faces, returning `(velocity, mass)` (spec.md §4.5
    /// "Splat").
    fn splat_particles(&self) -> (MacArray<f64>, MacArray<f64>) {
        let shape = self.shape;
        let mut velocity = MacArray::<f64>::new(shape);
        let mut mass = MacArray::<f64>::new(shape);
        for dim in 0..3 {
            self.engine.splat(dim, &mut velocity, &mut mass, self.config.apic);
        }
        (velocity, mass)
    }

    /// Applies gravity and the scene's step-source hook (spec.md §6 "Step source hook"):
    /// velocity sources at face locations, density sources at cell locations, with
    /// dust-particle conversion of the injected density bucket.
    fn add_body_forces(&mut self, dt: f64) {
        let shape = self.shape;
        let dx = shape.dx();
        let gravity = self.config.gravity_vec();
        let time = self.time;
        let scene = &self.scene;
        let current = &self.velocity;

        let mut updated = MacArray::<f64>::new(shape);
        for dim in 0..3 {
            let face_shape = shape.face(dim);
            for k in 0..face_shape.d {
                for j in 0..face_shape.h {
                    for i in 0..face_shape.w {
                        if current.get(dim, i, j, k).is_none() {
                            continue;
                        }
                        let p = shape.face_center(dim, i, j, k);
                        let mut u = sample_velocity(current, dx, p) + gravity * dt;
                        let mut d_unused = 0.0;
                        scene.add(p, &mut u, &mut d_unused, time, dt);
                        updated.set(dim, i, j, k, u[dim]);
                    }
                }
            }
        }
        self.velocity = updated;

        if self.scene.has_add() {
            let scene = &self.scene;
            let velocity = &self.velocity;
            let mut bucket_events: Vec<(f64, Vector3<f64>, Vector3<f64>)> = Vec::new();
            for k in 0..shape.d {
                for j in 0..shape.h {
                    for i in 0..shape.w {
                        let p = shape.cell_center(i, j, k);
                        let mut u_unused = Vector3::zero();
                        let mut d = 0.0;
                        scene.add(p, &mut u_unused, &mut d, time, dt);
                        if d > 0.0 {
                            bucket_events.push((d, p, sample_velocity(velocity, dx, p)));
                        }
                    }
                }
            }
            for (d, p, v) in bucket_events {
                self.engine.convert_density_bucket(d, p, v);
            }
        }
    }

    /// Builds and solves the pressure-Poisson system, applies the pressure gradient, and
    /// (optionally) surface tension (spec.md §4.6).
    fn project(&mut self, dt: f64) {
        let shape = self.shape;
        let nodal_shape = shape.nodal();

        let solid_nodal = &self.solid_nodal;
        let area = compute_area_fraction(shape, EPS_FRACTION, |i, j, k| solid_nodal[nodal_shape.linear_index(i, j, k)]);

        let fluid = &self.fluid;
        let density = compute_fluid_fraction(shape, EPS_FRACTION, |i, j, k| fluid[shape.linear_index(i, j, k)]);

        let current_volume = self.total_fluid_volume();
        let target_volume = *self.target_volume.get_or_insert(current_volume);

        let rhs_bias = if self.config.volume_correction {
            self.volume_controller.bias(current_volume, target_volume, self.config.correction_gain, dt)
        } else {
            0.0
        };

        let result = pressure::solve(shape, dt, &self.fluid, &area, &density, &self.velocity, rhs_bias, &self.pcg_config);
        if let Some(diag) = &result.diagnostic {
            warn!("pressure solve diagnostic: {}", diag);
        }
        if !result.report.converged {
            warn!(
                "pressure solve did not reach target residual after {} iterations (residual {:e})",
                result.report.iterations, result.report.residual
            );
        }

        pressure::apply_gradient(shape, dt, &result.pressure, &area, &density, &mut self.velocity);

        if self.config.surface_tension.abs() > 0.0 {
            self.apply_surface_tension(dt, &area, &density);
        }
    }

    /// Adds the surface-tension correction `-sgn * dt * sigma / (dx * rho) * kappa_face` to
    /// every partially-fluid face (spec.md §4.6 "Surface tension").
    fn apply_surface_tension(&mut self, dt: f64, area: &MacArray<f64>, density: &MacArray<f64>) {
        let shape = self.shape;
        let dx = shape.dx();
        let sigma = self.config.surface_tension;
        let fluid = self.fluid.clone();

        for dim in 0..3 {
            let face_shape = shape.face(dim);
            for k in 0..face_shape.d {
                for j in 0..face_shape.h {
                    for i in 0..face_shape.w {
                        let rho = density.get(dim, i, j, k).unwrap_or(0.0);
                        if rho <= 0.0 || rho >= 1.0 {
                            continue;
                        }
                        if area.get(dim, i, j, k).unwrap_or(0.0) <= 0.0 {
                            continue;
                        }
                        let mut lo = [i, j, k];
                        lo[dim] -= 1;
                        let (li, lj, lk) = shape.clamp(lo[0], lo[1], lo[2]);
                        let (hi_i, hi_j, hi_k) = shape.clamp(i, j, k);

                        let phi_lo = fluid[shape.linear_index(li, lj, lk)];
                        let phi_hi = fluid[shape.linear_index(hi_i, hi_j, hi_k)];
                        let sgn = if phi_hi >= phi_lo { 1.0 } else { -1.0 };
                        let theta = if sgn >= 0.0 { rho } else { 1.0 - rho };
                        let kappa_back = curvature_at(shape, &fluid, li, lj, lk);
                        let kappa_forward = curvature_at(shape, &fluid, hi_i, hi_j, hi_k);
                        let kappa_face = theta * kappa_forward + (1.0 - theta) * kappa_back;

                        if let Some(u) = self.velocity.get(dim, i, j, k) {
                            let delta = -sgn * dt * sigma / (dx * rho) * kappa_face;
                            self.velocity.set(dim, i, j, k, u + delta);
                        }
                    }
                }
            }
        }
    }

    /// Re-extrapolates the level set across solid and re-redistances the narrow band after
    /// projection has moved the interface (spec.md §2, "extend velocity and level set into
    /// narrow band").
    fn extend_narrowband(&mut self) {
        let shape = self.shape;
        extrapolate_levelset(shape, &self.solid, &mut self.fluid);
        self.redistance_levelset();
    }

    /// Sums `get_cell_volume` over every cell's nodal-sampled corners (spec.md §4.1, §4.6
    /// "Volume correction").
    fn total_fluid_volume(&self) -> f64 {
        let shape = self.shape;
        let dx = shape.dx();
        let node_at = |i: i32, j: i32, k: i32| sample_cell_scalar(shape, &self.fluid, shape.node_center(i, j, k));

        let mut volume = 0.0;
        for k in 0..shape.d {
            for j in 0..shape.h {
                for i in 0..shape.w {
                    let field = [
                        node_at(i, j, k),
                        node_at(i + 1, j, k),
                        node_at(i + 1, j + 1, k),
                        node_at(i, j + 1, k),
                        node_at(i, j, k + 1),
                        node_at(i + 1, j, k + 1),
                        node_at(i + 1, j + 1, k + 1),
                        node_at(i, j + 1, k + 1),
                    ];
                    volume += get_cell_volume(field) * dx * dx * dx;
                }
            }
        }
        volume
    }
}

fn apic_affine(velocity: &MacArray<f64>, dx: f64, p: Vector3<f64>) -> [Vector3<f64>; 3] {
    let h = 0.5 * dx;
    let grad = |dim: usize| -> Vector3<f64> {
        Vector3::new(
            (sample_face(velocity, dim, dx, p + Vector3::new(h, 0.0, 0.0)) - sample_face(velocity, dim, dx, p - Vector3::new(h, 0.0, 0.0)))
                / dx,
            (sample_face(velocity, dim, dx, p + Vector3::new(0.0, h, 0.0)) - sample_face(velocity, dim, dx, p - Vector3::new(0.0, h, 0.0)))
                / dx,
            (sample_face(velocity, dim, dx, p + Vector3::new(0.0, 0.0, h)) - sample_face(velocity, dim, dx, p - Vector3::new(0.0, 0.0, h)))
                / dx,
        )
    };
    [grad(0), grad(1), grad(2)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still_water_scene() -> SceneDescription {
        SceneDescription::new("hydrostatic_rest").with_fluid(|p| p.y - 0.5).with_solid(|p| {
            let dist_to_wall = p.x.min(1.0 - p.x).min(p.y).min(1.0 - p.y).min(p.z).min(1.0 - p.z);
            dist_to_wall
        })
    }

    #[test]
    fn new_solver_seeds_particles_inside_fluid() {
        let mut config = Config::default();
        config.resolution_x = 8;
        config.resolution_y = 8;
        config.resolution_z = 8;
        let solver = Solver::new(config, still_water_scene()).unwrap();
        assert!(solver.particle_count() > 0);
    }

    #[test]
    fn step_runs_without_panicking_and_advances_time() {
        let mut config = Config::default();
        config.resolution_x = 6;
        config.resolution_y = 6;
        config.resolution_z = 6;
        config.min_particles_per_cell = 2;
        config.max_particles_per_cell = 2;
        let mut solver = Solver::new(config, still_water_scene()).unwrap();
        let dx = solver.shape().dx();
        solver.step(0.2 * dx);
        assert!((solver.time() - 0.2 * dx).abs() < 1e-12);
    }

    #[test]
    fn total_fluid_volume_is_positive_for_half_filled_domain() {
        let mut config = Config::default();
        config.resolution_x = 8;
        config.resolution_y = 8;
        config.resolution_z = 8;
        let solver = Solver::new(config, still_water_scene()).unwrap();
        let volume = solver.fluid_volume();
        assert!(volume > 0.0 && volume < 1.0);
    }
}
