//! Face-staggered (MAC) array: one sparse array per spatial direction (spec §3).
//!
//! Grounded directly on `blub::hybrid_fluid::HybridFluid`'s per-axis
//! `volume_velocity_{x,y,z}` textures, generalized from GPU textures to per-axis
//! [`SparseArray`]s over `shape.face(dim)`.

use crate::grid::shape::Shape3;
use crate::grid::sparse_array::SparseArray;

/// One [`SparseArray`] per axis, each shaped by `cell_shape.face(dim)`. Iteration order is
/// `(dim, i, j, k)` per spec.md §3.
pub struct MacArray<T: Copy> {
    cell_shape: Shape3,
    axes: [SparseArray<T>; 3],
}

impl<T: Copy> MacArray<T> {
    pub fn new(cell_shape: Shape3) -> Self {
        MacArray {
            cell_shape,
            axes: [
                SparseArray::new(cell_shape.face(0)),
                SparseArray::new(cell_shape.face(1)),
                SparseArray::new(cell_shape.face(2)),
            ],
        }
    }

    pub fn cell_shape(&self) -> Shape3 {
        self.cell_shape
    }

    pub fn axis(&self, dim: usize) -> &SparseArray<T> {
        &self.axes[dim]
    }

    pub fn axis_mut(&mut self, dim: usize) -> &mut SparseArray<T> {
        &mut self.axes[dim]
    }

    pub fn get(&self, dim: usize, i: i32, j: i32, k: i32) -> Option<T> {
        self.axes[dim].get(i, j, k)
    }

    pub fn set(&mut self, dim: usize, i: i32, j: i32, k: i32, value: T) {
        self.axes[dim].set(i, j, k, value);
    }

    pub fn active(&self, dim: usize, i: i32, j: i32, k: i32) -> bool {
        self.axes[dim].active(i, j, k)
    }

    /// Iterates `(dim, i, j, k, value)` across all three axes, active cells only.
    pub fn for_each_active<F: FnMut(usize, i32, i32, i32, T)>(&self, mut f: F) {
        for dim in 0..3 {
            let shape = self.axes[dim].shape();
            for k in 0..shape.d {
                for j in 0..shape.h {
                    for i in 0..shape.w {
                        if let Some(v) = self.axes[dim].get(i, j, k) {
                            f(dim, i, j, k, v);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_shapes_match_face_shapes() {
        let mac = MacArray::<f64>::new(Shape3::new(4, 4, 4));
        assert_eq!(mac.axis(0).shape(), Shape3::new(5, 4, 4));
        assert_eq!(mac.axis(1).shape(), Shape3::new(4, 5, 4));
        assert_eq!(mac.axis(2).shape(), Shape3::new(4, 4, 5));
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut mac = MacArray::<f64>::new(Shape3::new(4, 4, 4));
        mac.set(0, 2, 2, 2, 1.5);
        assert_eq!(mac.get(0, 2, 2, 2), Some(1.5));
        assert_eq!(mac.get(1, 2, 2, 2), None);
    }
}
