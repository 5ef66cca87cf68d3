//! Grid-level advection driver (spec §4.4, §2 pipeline stages "advect level set" / "advect
//! face velocity").
//!
//! `original_source/src/advection/macadvection3.cpp` drives its forward-trace /
//! backward-trace / MacCormack-correct / narrow-band-clamp loop over a whole `array3<T>`
//! field rather than one sample at a time; [`semi_lagrangian`], [`maccormack`], and [`weno`]
//! only expose the per-sample primitives that loop wires together. This module is that loop,
//! generalized to this crate's dense `Vec<f64>` cell fields and [`MacArray`] face fields.

use cgmath::Vector3;

use crate::advection::maccormack;
use crate::advection::semi_lagrangian::back_trace;
use crate::advection::weno::{interp4, interp6, interp6_tensor3};
use crate::config::{Config, WenoOrder};
use crate::grid::mac_array::MacArray;
use crate::grid::shape::Shape3;

fn trilerp_local<F: Fn(i32, i32, i32) -> f64>(local: Vector3<f64>, get: &F) -> f64 {
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

/// Tensor-product WENO sample at fractional local coordinates, gathering the 4^3 or 6^3
/// stencil around `local` through `get`.
fn weno_local<F: Fn(i32, i32, i32) -> f64>(order: WenoOrder, local: Vector3<f64>, get: &F) -> f64 {
    let eps = 1e-6;
    let i0 = local.x.floor() as i32;
    let j0 = local.y.floor() as i32;
    let k0 = local.z.floor() as i32;
    let fx = local.x - i0 as f64;
    let fy = local.y - j0 as f64;
    let fz = local.z - k0 as f64;
    match order {
        WenoOrder::Four => {
            let mut along_x = [[0.0f64; 4]; 4];
            for dj in 0..4i32 {
                for dk in 0..4i32 {
                    let v = [
                        get(i0 - 1, j0 - 1 + dj, k0 - 1 + dk),
                        get(i0, j0 - 1 + dj, k0 - 1 + dk),
                        get(i0 + 1, j0 - 1 + dj, k0 - 1 + dk),
                        get(i0 + 2, j0 - 1 + dj, k0 - 1 + dk),
                    ];
                    along_x[dj as usize][dk as usize] = interp4(fx, v, eps);
                }
            }
            let mut along_y = [0.0f64; 4];
            for dk in 0..4usize {
                let row = [along_x[0][dk], along_x[1][dk], along_x[2][dk], along_x[3][dk]];
                along_y[dk] = interp4(fy, row, eps);
            }
            interp4(fz, along_y, eps)
        }
        WenoOrder::Six => {
            let mut samples = [[[0.0f64; 6]; 6]; 6];
            for dj in 0..6usize {
                for dk in 0..6usize {
                    for di in 0..6usize {
                        samples[dj][dk][di] = get(i0 - 2 + di as i32, j0 - 2 + dj as i32, k0 - 2 + dk as i32);
                    }
                }
            }
            interp6_tensor3(fx, fy, fz, &samples, eps)
        }
    }
}

/// Samples `get` at `local` with the configured scheme, plus the 2x2x2 corner min/max used as
/// the MacCormack clamp stencil (spec.md §4.4, "clamp to the local min/max at the forward
/// trace").
fn sample_with_stencil<F: Fn(i32, i32, i32) -> f64>(local: Vector3<f64>, config: &Config, get: F) -> (f64, f64, f64) {
    let i0 = local.x.floor() as i32;
    let j0 = local.y.floor() as i32;
    let k0 = local.z.floor() as i32;
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for di in 0..2 {
        for dj in 0..2 {
            for dk in 0..2 {
                let v = get(i0 + di, j0 + dj, k0 + dk);
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
    }
    let value = if config.weno { weno_local(config.weno_order, local, &get) } else { trilerp_local(local, &get) };
    (value, lo, hi)
}

/// Advects a dense cell-centered scalar field by one step of semi-Lagrangian (or, when
/// `config.maccormack` is set, MacCormack-corrected) advection (spec.md §2, "advect level
/// set"). `near_surface(i, j, k)` selects the per-cell narrow-band clamp fallback.
pub fn advect_cell_scalar<V, N>(shape: Shape3, dt: f64, values: &[f64], velocity_at: &V, config: &Config, near_surface: N) -> Vec<f64>
where
    V: Fn(Vector3<f64>) -> Vector3<f64>,
    N: Fn(i32, i32, i32) -> bool,
{
    let dx = shape.dx();
    let n = values.len();
    let get_in = |i: i32, j: i32, k: i32| {
        let (ci, cj, ck) = shape.clamp(i, j, k);
        values[shape.linear_index(ci, cj, ck)]
    };
    let to_local = |p: Vector3<f64>| Vector3::new(p.x / dx - 0.5, p.y / dx - 0.5, p.z / dx - 0.5);

    let mut q0 = vec![0.0; n];
    let mut lo = vec![0.0; n];
    let mut hi = vec![0.0; n];
    for k in 0..shape.d {
        for j in 0..shape.h {
            for i in 0..shape.w {
                let idx = shape.linear_index(i, j, k);
                let p = shape.cell_center(i, j, k);
                let p_back = back_trace(p, dt, velocity_at);
                let (value, l, h) = sample_with_stencil(to_local(p_back), config, &get_in);
                q0[idx] = value;
                lo[idx] = l;
                hi[idx] = h;
            }
        }
    }

    if !config.maccormack {
        return q0;
    }

    let get_q0 = |i: i32, j: i32, k: i32| {
        let (ci, cj, ck) = shape.clamp(i, j, k);
        q0[shape.linear_index(ci, cj, ck)]
    };
    let mut out = vec![0.0; n];
    for k in 0..shape.d {
        for j in 0..shape.h {
            for i in 0..shape.w {
                let idx = shape.linear_index(i, j, k);
                let p = shape.cell_center(i, j, k);
                let p_reversed = back_trace(p, -dt, velocity_at);
                let local = to_local(p_reversed);
                let q1 = if config.weno { weno_local(config.weno_order, local, &get_q0) } else { trilerp_local(local, &get_q0) };
                let result = maccormack::correct(q0[idx], values[idx], q1, lo[idx], hi[idx], near_surface(i, j, k));
                out[idx] = result.value;
            }
        }
    }
    out
}

/// Advects one axis of a MAC-staggered field the same way (spec.md §2, "advect face
/// velocity"): `velocity_at` samples the full vector field for the back-trace, while the
/// scalar carried through the stencil is this one axis's face values.
pub fn advect_mac_axis<V, N>(shape: Shape3, dim: usize, dt: f64, mac: &MacArray<f64>, velocity_at: &V, config: &Config, near_surface: N) -> MacArray<f64>
where
    V: Fn(Vector3<f64>) -> Vector3<f64>,
    N: Fn(i32, i32, i32) -> bool,
{
    let dx = shape.dx();
    let face_shape = shape.face(dim);
    let offset = Vector3::new(if dim == 0 { 0.0 } else { 0.5 }, if dim == 1 { 0.0 } else { 0.5 }, if dim == 2 { 0.0 } else { 0.5 });
    let to_local = |p: Vector3<f64>| Vector3::new(p.x / dx - offset.x, p.y / dx - offset.y, p.z / dx - offset.z);
    let get_in = |i: i32, j: i32, k: i32| {
        let (ci, cj, ck) = face_shape.clamp(i, j, k);
        mac.get(dim, ci, cj, ck).unwrap_or(0.0)
    };

    let n = face_shape.count() as usize;
    let mut q0 = vec![0.0; n];
    let mut q_in = vec![0.0; n];
    let mut lo = vec![0.0; n];
    let mut hi = vec![0.0; n];
    for k in 0..face_shape.d {
        for j in 0..face_shape.h {
            for i in 0..face_shape.w {
                let idx = face_shape.linear_index(i, j, k);
                q_in[idx] = mac.get(dim, i, j, k).unwrap_or(0.0);
                let p = shape.face_center(dim, i, j, k);
                let p_back = back_trace(p, dt, velocity_at);
                let (value, l, h) = sample_with_stencil(to_local(p_back), config, &get_in);
                q0[idx] = value;
                lo[idx] = l;
                hi[idx] = h;
            }
        }
    }

    let mut out = MacArray::<f64>::new(shape);
    if !config.maccormack {
        for k in 0..face_shape.d {
            for j in 0..face_shape.h {
                for i in 0..face_shape.w {
                    out.set(dim, i, j, k, q0[face_shape.linear_index(i, j, k)]);
                }
            }
        }
        return out;
    }

    let get_q0 = |i: i32, j: i32, k: i32| {
        let (ci, cj, ck) = face_shape.clamp(i, j, k);
        q0[face_shape.linear_index(ci, cj, ck)]
    };
    for k in 0..face_shape.d {
        for j in 0..face_shape.h {
            for i in 0..face_shape.w {
                let idx = face_shape.linear_index(i, j, k);
                let p = shape.face_center(dim, i, j, k);
                let p_reversed = back_trace(p, -dt, velocity_at);
                let local = to_local(p_reversed);
                let q1 = if config.weno { weno_local(config.weno_order, local, &get_q0) } else { trilerp_local(local, &get_q0) };
                let result = maccormack::correct(q0[idx], q_in[idx], q1, lo[idx], hi[idx], near_surface(i, j, k));
                out.set(dim, i, j, k, result.value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_field_under_zero_velocity_is_unchanged() {
        let shape = Shape3::new(4, 4, 4);
        let values = vec![-0.5; shape.count() as usize];
        let config = Config::default();
        let out = advect_cell_scalar(shape, 0.01, &values, &|_| Vector3::new(0.0, 0.0, 0.0), &config, |_, _, _| false);
        for &v in &out {
            assert!((v - (-0.5)).abs() < 1e-9);
        }
    }

    #[test]
    fn linear_ramp_advects_under_uniform_velocity() {
        let shape = Shape3::new(8, 4, 4);
        let dx = shape.dx();
        let mut values = vec![0.0; shape.count() as usize];
        for k in 0..shape.d {
            for j in 0..shape.h {
                for i in 0..shape.w {
                    values[shape.linear_index(i, j, k)] = shape.cell_center(i, j, k).x;
                }
            }
        }
        let mut config = Config::default();
        config.maccormack = false;
        let dt = dx;
        let out = advect_cell_scalar(shape, dt, &values, &|_| Vector3::new(1.0, 0.0, 0.0), &config, |_, _, _| false);
        let idx = shape.linear_index(4, 2, 2);
        let expected = shape.cell_center(4, 2, 2).x - dt;
        assert!((out[idx] - expected).abs() < 1e-9);
    }
}
