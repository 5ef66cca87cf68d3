//! BackwardFlip velocity-memory layer (spec §4.8).
//!
//! Grounded on `original_source/src/backwardflip/macbackwardflip3.cpp` for ring-buffer layer
//! accumulation (accumulative mode sums against the *front* of the deque) and the
//! Hachisuka forward-tracer vs. backtrace strategies (SPEC_FULL.md §11).

use std::collections::VecDeque;

use cgmath::Vector3;

/// One recorded time step of velocity/gradient/density memory (spec.md §3
/// "BackwardFlip layer").
#[derive(Debug, Clone)]
pub struct Layer {
    pub u0: Vec<f64>,
    pub u1: Vec<f64>,
    pub u_reconstructed: Vec<f64>,
    pub g: Vec<f64>,
    pub d0: Vec<f64>,
    pub d1: Vec<f64>,
    pub d_added: Vec<f64>,
    pub dt: f64,
    pub time: f64,
}

/// Ring buffer of [`Layer`]s, newest at front, bounded by `max_layers`
/// (spec.md §4.8). `max_velocity_layers` further bounds how many layers a velocity-only
/// reconstruction pass may reuse.
pub struct LayerBuffer {
    layers: VecDeque<Layer>,
    max_layers: usize,
    max_velocity_layers: usize,
    accumulative: bool,
}

impl LayerBuffer {
    pub fn new(max_layers: usize, max_velocity_layers: usize, accumulative: bool) -> Self {
        LayerBuffer {
            layers: VecDeque::with_capacity(max_layers),
            max_layers,
            max_velocity_layers: max_velocity_layers.min(max_layers),
            accumulative,
        }
    }

    pub fn max_velocity_layers(&self) -> usize {
        self.max_velocity_layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn front(&self) -> Option<&Layer> {
        self.layers.front()
    }

    pub fn get(&self, depth: usize) -> Option<&Layer> {
        self.layers.get(depth)
    }

    /// Registers a new layer, summing `g`/`d_added` against the current front when
    /// accumulative mode is enabled, then evicts the oldest layer past `max_layers`.
    pub fn push(&mut self, mut layer: Layer) {
        if self.accumulative {
            if let Some(front) = self.layers.front() {
                for i in 0..layer.g.len() {
                    layer.g[i] += front.g[i];
                }
                for i in 0..layer.d_added.len() {
                    layer.d_added[i] += front.d_added[i];
                }
            }
        }
        self.layers.push_front(layer);
        while self.layers.len() > self.max_layers {
            self.layers.pop_back();
        }
    }
}

/// A Hachisuka forward tracer: seeded on a dense `r_sample^3` lattice, integrated forward in
/// time while accumulating the pressure-gradient impulse it experiences (spec.md §4.8
/// "Hachisuka forward tracers").
#[derive(Debug, Clone, Copy)]
pub struct ForwardTracer {
    pub position: Vector3<f64>,
    pub g_integrated: Vector3<f64>,
    pub steps_since_reset: u32,
}

impl ForwardTracer {
    pub fn new(position: Vector3<f64>) -> Self {
        ForwardTracer { position, g_integrated: Vector3::new(0.0, 0.0, 0.0), steps_since_reset: 0 }
    }

    /// Advances one step: `p += 0.5*dt*(v0(p) + v1(p + dt*v0(p)))`, and accumulates `g` at
    /// the midpoint into `g_integrated`. Resets after `max_velocity_layers` steps.
    pub fn step<V0, V1, G>(&mut self, dt: f64, v0: V0, v1: V1, g_at: G, max_velocity_layers: u32)
    where
        V0: Fn(Vector3<f64>) -> Vector3<f64>,
        V1: Fn(Vector3<f64>) -> Vector3<f64>,
        G: Fn(Vector3<f64>) -> Vector3<f64>,
    {
        let v_start = v0(self.position);
        let advanced = self.position + dt * v_start;
        let v_end = v1(advanced);
        let mid = self.position + 0.5 * dt * (v_start + v_end);
        self.g_integrated += g_at(mid);
        self.position = self.position + 0.5 * dt * (v_start + v_end);

        self.steps_since_reset += 1;
        if self.steps_since_reset >= max_velocity_layers {
            self.g_integrated = Vector3::new(0.0, 0.0, 0.0);
            self.steps_since_reset = 0;
        }
    }
}

/// A mesh-free tracker particle integrated backward through the layer deque
/// (spec.md §4.8 "Backtrace").
#[derive(Debug, Clone, Copy)]
pub struct Tracker {
    pub position: Vector3<f64>,
}

impl Tracker {
    /// Integrates back through `buffer`, accumulating reconstructed velocity with weight
    /// `w_k = advance_step * decay_rate^(depth-k-1-0.5*step)`. `sample` looks up
    /// `u_reconstructed` and `g` at a world position within a given layer's fields.
    pub fn backtrace<Sample>(
        &self,
        buffer: &LayerBuffer,
        decay_rate: f64,
        advance_step: f64,
        sample: Sample,
    ) -> Vector3<f64>
    where
        Sample: Fn(usize, Vector3<f64>) -> (Vector3<f64>, Vector3<f64>),
    {
        let depth = buffer.len();
        let mut p = self.position;
        let mut u_rec = Vector3::new(0.0, 0.0, 0.0);

        for k in 0..depth {
            let (u_reconstructed, g) = sample(k, p);
            let step = 1.0; // one layer per backtrace iteration unless temporally coalesced
            let weight = advance_step * decay_rate.powf(depth as f64 - k as f64 - 1.0 - 0.5 * step);
            u_rec += weight * (u_reconstructed + g);

            // Two-stage midpoint back through this layer using the layer's own dt.
            if let Some(layer) = buffer.get(k) {
                p -= layer.dt * u_reconstructed;
            }
        }
        u_rec
    }

    /// Decides whether `step` consecutive layers may be coalesced into one larger backtrace
    /// step under temporal adaptivity: `dt^2 * |u_passive|^2 < (adaptive_rate * dx / step)^2`
    /// (spec.md §4.8).
    pub fn may_coalesce(dt: f64, u_passive: Vector3<f64>, adaptive_rate: f64, dx: f64, step: u32) -> bool {
        use cgmath::InnerSpace;
        let lhs = dt * dt * u_passive.magnitude2();
        let rhs = (adaptive_rate * dx / step as f64).powi(2);
        lhs < rhs
    }
}

/// Converts reconstructed tracker velocities to face values by weighted averaging, then
/// optionally sheds residual grid error: `u_face -= inject_diff * (u_current_grid -
/// u_tracker_initial)` (spec.md §4.8 "Reconstruction").
pub fn reconstruct_faces(tracker_face_velocity: f64, current_grid: f64, tracker_initial: f64, inject_diff: f64) -> f64 {
    tracker_face_velocity - inject_diff * (current_grid - tracker_initial)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_layer(n: usize, dt: f64, time: f64) -> Layer {
        Layer {
            u0: vec![0.0; n],
            u1: vec![0.0; n],
            u_reconstructed: vec![0.0; n],
            g: vec![0.0; n],
            d0: vec![0.0; n],
            d1: vec![0.0; n],
            d_added: vec![0.0; n],
            dt,
            time,
        }
    }

    #[test]
    fn push_evicts_oldest_past_capacity() {
        let mut buffer = LayerBuffer::new(2, 2, false);
        buffer.push(empty_layer(1, 0.01, 0.0));
        buffer.push(empty_layer(1, 0.01, 0.01));
        buffer.push(empty_layer(1, 0.01, 0.02));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.front().unwrap().time, 0.02);
    }

    #[test]
    fn accumulative_mode_sums_against_front() {
        let mut buffer = LayerBuffer::new(4, 4, true);
        let mut first = empty_layer(1, 0.01, 0.0);
        first.g[0] = 1.0;
        buffer.push(first);
        let second = empty_layer(1, 0.01, 0.01);
        buffer.push(second);
        assert_eq!(buffer.front().unwrap().g[0], 1.0);
    }

    #[test]
    fn forward_tracer_resets_after_max_layers() {
        let mut tracer = ForwardTracer::new(Vector3::new(0.0, 0.0, 0.0));
        for _ in 0..3 {
            tracer.step(0.01, |_| Vector3::new(1.0, 0.0, 0.0), |_| Vector3::new(1.0, 0.0, 0.0), |_| Vector3::new(1.0, 0.0, 0.0), 3);
        }
        assert_eq!(tracer.steps_since_reset, 0);
        assert_eq!(tracer.g_integrated, Vector3::new(0.0, 0.0, 0.0));
    }
}
