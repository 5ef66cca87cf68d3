//! Level-set combination, extrapolation, and narrow-band maintenance (spec §4.1).
//!
//! Grounded on `original_source/src/utility/gridutility3.cpp` and spec.md §4.1.

use crate::grid::shape::Shape3;
use crate::grid::sparse_array::SparseArray;

const NEIGHBOR_OFFSETS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// `combine_levelset(solid, fluid) -> combined`: `max(fluid, -(solid + dx))` cell-wise,
/// so the fluid level set never reports "inside fluid" where the solid has already claimed
/// the cell (spec.md §3, "Levelset invariants").
pub fn combine_levelset(shape: Shape3, solid: &[f64], fluid: &[f64]) -> Vec<f64> {
    let dx = shape.dx();
    solid
        .iter()
        .zip(fluid.iter())
        .map(|(&s, &f)| f.max(-(s + dx)))
        .collect()
}

/// Pushes level-set values from the fluid side toward solid along the solid gradient; falls
/// back to a horizontal (axis-aligned) average when the solid normal is steeper than 45°
/// from vertical, i.e. `|grad.y| < |grad.x| and |grad.y| < |grad.z|` in the cell frame used
/// here (spec.md §4.1).
pub fn extrapolate_levelset(shape: Shape3, solid: &[f64], fluid: &mut [f64]) {
    let dx = shape.dx();
    let idx = |i: i32, j: i32, k: i32| shape.linear_index(i, j, k);
    let get = |v: &[f64], i: i32, j: i32, k: i32| {
        let (ci, cj, ck) = shape.clamp(i, j, k);
        v[idx(ci, cj, ck)]
    };

    let original = fluid.to_vec();
    for k in 0..shape.d {
        for j in 0..shape.h {
            for i in 0..shape.w {
                let here = idx(i, j, k);
                if solid[here] > 0.0 {
                    continue;
                }
                let gx = (get(solid, i + 1, j, k) - get(solid, i - 1, j, k)) / (2.0 * dx);
                let gy = (get(solid, i, j + 1, k) - get(solid, i, j - 1, k)) / (2.0 * dx);
                let gz = (get(solid, i, j, k + 1) - get(solid, i, j, k - 1)) / (2.0 * dx);
                let steep = gy.abs() < gx.abs() && gy.abs() < gz.abs();
                let value = if steep {
                    // Horizontal fallback: average the axis-aligned in-plane neighbors.
                    0.25
                        * (get(&original, i + 1, j, k)
                            + get(&original, i - 1, j, k)
                            + get(&original, i, j, k + 1)
                            + get(&original, i, j, k - 1))
                } else {
                    // Step one cell along the ascending solid gradient.
                    let step = |g: f64| if g >= 0.0 { 1 } else { -1 };
                    get(&original, i + step(gx), j + step(gy), k + step(gz))
                };
                fluid[here] = value;
            }
        }
    }
}

/// Activates exactly the cells whose value changes sign across any face neighbor, then
/// dilates the resulting set by `w - 1` (spec.md §4.1).
pub fn mark_narrowband(shape: Shape3, levelset: &[f64], w: u32) -> SparseArray<f64> {
    let mut band = SparseArray::<f64>::new(shape);
    let idx = |i: i32, j: i32, k: i32| shape.linear_index(i, j, k);

    for k in 0..shape.d {
        for j in 0..shape.h {
            for i in 0..shape.w {
                let here = levelset[idx(i, j, k)];
                let mut crosses = false;
                for &(di, dj, dk) in &NEIGHBOR_OFFSETS {
                    let (ni, nj, nk) = (i + di, j + dj, k + dk);
                    if shape.out_of_bounds(ni, nj, nk) {
                        continue;
                    }
                    if (levelset[idx(ni, nj, nk)] < 0.0) != (here < 0.0) {
                        crosses = true;
                        break;
                    }
                }
                if crosses {
                    band.set(i, j, k, here);
                }
            }
        }
    }

    for _ in 0..w.saturating_sub(1) {
        band.dilate(|i, j, k| Some(levelset[idx(i, j, k)]));
    }
    band
}

/// Deactivates anything outside the given set (spec.md §4.1 `trim_narrowband`).
pub fn trim_narrowband(target: &mut SparseArray<f64>, keep: &SparseArray<f64>) {
    let shape = target.shape();
    for k in 0..shape.d {
        for j in 0..shape.h {
            for i in 0..shape.w {
                if target.active(i, j, k) && !keep.active(i, j, k) {
                    target.set_off(i, j, k);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_levelset_clips_into_solid() {
        let shape = Shape3::new(2, 2, 2);
        let solid = vec![1.0; 8];
        let fluid = vec![-1.0; 8];
        let combined = combine_levelset(shape, &solid, &fluid);
        assert!(combined.iter().all(|&v| v <= -1.0));
    }

    #[test]
    fn mark_narrowband_activates_sign_change_cells() {
        let shape = Shape3::new(4, 1, 1);
        let levelset = vec![-1.0, -0.1, 0.1, 1.0];
        let band = mark_narrowband(shape, &levelset, 1);
        assert!(band.active(1, 0, 0));
        assert!(band.active(2, 0, 0));
        assert!(!band.active(0, 0, 0));
    }
}
