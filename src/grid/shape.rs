//! Grid shapes and index/world conversions (spec §3 "Shapes").
//!
//! Grounded on `examples/original_source/include/shiokaze/array/shape.h`: derived shapes
//! (`nodal`, `face`, `edge`), `dx()`, `clamp`, `out_of_bounds`, and the `on_edge` open
//! question (spec.md §9) preserved exactly as the redundant `k==d-1 || k==d-1` clause rather
//! than silently corrected to `k==0 || k==d-1`.

use cgmath::Vector3;

/// A 3D staggered-grid shape `(w, h, d)`. 2D end-to-end scenarios (spec.md §8) are realized
/// as a depth-1 slab of this type rather than a parallel `Shape2`, per spec.md's own
/// Non-goal excluding "all 2D variants that duplicate the 3D logic".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape3 {
    pub w: i32,
    pub h: i32,
    pub d: i32,
}

impl Shape3 {
    pub fn new(w: i32, h: i32, d: i32) -> Self {
        Shape3 { w, h, d }
    }

    pub fn count(&self) -> i64 {
        self.w as i64 * self.h as i64 * self.d as i64
    }

    pub fn hash(&self) -> i32 {
        self.w ^ (self.h << 1) ^ (self.d << 2)
    }

    /// Shape of the nodal (corner) array over this cell shape.
    pub fn nodal(&self) -> Shape3 {
        Shape3::new(self.w + 1, self.h + 1, self.d + 1)
    }

    /// Shape of the `dim`-direction face array over this cell shape.
    pub fn face(&self, dim: usize) -> Shape3 {
        Shape3::new(
            self.w + (dim == 0) as i32,
            self.h + (dim == 1) as i32,
            self.d + (dim == 2) as i32,
        )
    }

    /// Shape of the `dim`-direction edge array over this cell shape (3D only).
    pub fn edge(&self, dim: usize) -> Shape3 {
        Shape3::new(
            self.w + (dim != 0) as i32,
            self.h + (dim != 1) as i32,
            self.d + (dim != 2) as i32,
        )
    }

    /// Canonical cell width: `1 / max(shape[dim])`.
    pub fn dx(&self) -> f64 {
        1.0 / (self.w.max(self.h).max(self.d) as f64)
    }

    pub fn clamp(&self, i: i32, j: i32, k: i32) -> (i32, i32, i32) {
        (
            i.clamp(0, self.w - 1),
            j.clamp(0, self.h - 1),
            k.clamp(0, self.d - 1),
        )
    }

    pub fn out_of_bounds(&self, i: i32, j: i32, k: i32) -> bool {
        i < 0 || j < 0 || k < 0 || i >= self.w || j >= self.h || k >= self.d
    }

    /// True on the boundary of the shape.
    ///
    /// Preserves a source bug verbatim (spec.md §9): the final two disjuncts are both
    /// `k==d-1`, leaving `k==0` unchecked on this clause. Do not "fix" to `k==0 || k==d-1`.
    pub fn on_edge(&self, i: i32, j: i32, k: i32) -> bool {
        i == 0 || j == 0 || i == self.w - 1 || j == self.h - 1 || k == self.d - 1 || k == self.d - 1
    }

    pub fn linear_index(&self, i: i32, j: i32, k: i32) -> usize {
        debug_assert!(!self.out_of_bounds(i, j, k));
        (i as usize) + (j as usize) * (self.w as usize) + (k as usize) * (self.w as usize) * (self.h as usize)
    }

    /// World-space location of a cell center.
    pub fn cell_center(&self, i: i32, j: i32, k: i32) -> Vector3<f64> {
        let dx = self.dx();
        Vector3::new(dx * (i as f64 + 0.5), dx * (j as f64 + 0.5), dx * (k as f64 + 0.5))
    }

    /// World-space location of a `dim`-direction face.
    pub fn face_center(&self, dim: usize, i: i32, j: i32, k: i32) -> Vector3<f64> {
        let dx = self.dx();
        let offset = |axis: usize| if axis == dim { 0.0 } else { 0.5 };
        Vector3::new(
            dx * (i as f64 + offset(0)),
            dx * (j as f64 + offset(1)),
            dx * (k as f64 + offset(2)),
        )
    }

    /// World-space location of a node (corner).
    pub fn node_center(&self, i: i32, j: i32, k: i32) -> Vector3<f64> {
        let dx = self.dx();
        Vector3::new(dx * i as f64, dx * j as f64, dx * k as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_shapes() {
        let s = Shape3::new(4, 5, 6);
        assert_eq!(s.nodal(), Shape3::new(5, 6, 7));
        assert_eq!(s.face(0), Shape3::new(5, 5, 6));
        assert_eq!(s.face(1), Shape3::new(4, 6, 6));
        assert_eq!(s.edge(0), Shape3::new(4, 6, 7));
    }

    #[test]
    fn on_edge_preserves_source_bug() {
        let s = Shape3::new(4, 4, 4);
        // k==0 alone should NOT be flagged as an edge per the preserved bug.
        assert!(!s.on_edge(1, 1, 0));
        assert!(s.on_edge(1, 1, 3));
        assert!(s.on_edge(0, 1, 1));
    }

    #[test]
    fn dx_uses_max_dimension() {
        let s = Shape3::new(32, 16, 32);
        assert!((s.dx() - 1.0 / 32.0).abs() < 1e-12);
    }
}
