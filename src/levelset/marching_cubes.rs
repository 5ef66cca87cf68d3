//! Marching-cubes cell volume (spec §4.1 "Marching cubes").
//!
//! Grounded on `original_source/src/utility/gridutility3.cpp`'s `get_cell_volume`: walk the
//! standard 256-case table (classical Bourke vertex/edge labeling), interpolate zero
//! crossings with `fraction(v1,v2) = v1/(v1-v2)` clamped to `[0,1]`, accumulate signed
//! tetrahedral volume over the generated triangle soup via the divergence theorem, then add
//! flux over the three positive-direction quad faces of the unit cell (SPEC_FULL.md §11).

use cgmath::{InnerSpace, Vector3};

/// Corner offsets in the classical Bourke marching-cubes vertex order.
const CORNER_OFFSET: [(f64, f64, f64); 8] = [
    (0.0, 0.0, 0.0),
    (1.0, 0.0, 0.0),
    (1.0, 1.0, 0.0),
    (0.0, 1.0, 0.0),
    (0.0, 0.0, 1.0),
    (1.0, 0.0, 1.0),
    (1.0, 1.0, 1.0),
    (0.0, 1.0, 1.0),
];

/// Endpoints (corner indices) of the twelve cube edges, in the classical order.
const EDGE_CORNERS: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

include!("mc_tables.rs");

fn fraction(v1: f64, v2: f64) -> f64 {
    (v1 / (v1 - v2)).clamp(0.0, 1.0)
}

fn edge_vertex(edge: usize, field: &[f64; 8]) -> Vector3<f64> {
    let (a, b) = EDGE_CORNERS[edge];
    let t = fraction(field[a], field[b]);
    let (ax, ay, az) = CORNER_OFFSET[a];
    let (bx, by, bz) = CORNER_OFFSET[b];
    Vector3::new(ax + t * (bx - ax), ay + t * (by - ay), az + t * (bz - az))
}

/// Computes a signed fluid volume inside a unit cell given its eight corner level-set
/// values (classical Bourke ordering), via marching-cubes triangulation of the zero
/// isosurface plus the three positive-face quad fluxes.
pub fn get_cell_volume(field: [f64; 8]) -> f64 {
    let mut cube_index = 0usize;
    for (i, &v) in field.iter().enumerate() {
        if v < 0.0 {
            cube_index |= 1 << i;
        }
    }

    let mut volume = 0.0;
    let edges = TRI_TABLE[cube_index];
    let mut i = 0;
    while i + 2 < edges.len() && edges[i] != -1 {
        let p0 = edge_vertex(edges[i] as usize, &field);
        let p1 = edge_vertex(edges[i + 1] as usize, &field);
        let p2 = edge_vertex(edges[i + 2] as usize, &field);

        // Divergence-form contribution of a triangle to the enclosed volume: (1/6) of the
        // signed tetrahedral volume with the origin as apex. Degenerate (zero cross
        // product) triangles contribute nothing.
        let cross = p1.cross(p2);
        let area2 = cross.magnitude2();
        if area2 > 0.0 {
            volume += p0.dot(cross) / 6.0;
        }
        i += 3;
    }

    // Flux over the three positive-direction quad faces of the unit cell closes the
    // divergence-theorem accumulation (gridutility3.cpp's second half of get_cell_volume).
    volume += quad_face_flux(1.0, 0.0, 0.0, 1.0);
    volume += quad_face_flux(0.0, 1.0, 0.0, 1.0);
    volume += quad_face_flux(0.0, 0.0, 1.0, 1.0);

    volume
}

/// Signed flux of the quad face at `normal * offset` spanning the unit square in the two
/// other axes, via the divergence theorem (two triangles of the quad).
fn quad_face_flux(nx: f64, ny: f64, nz: f64, offset: f64) -> f64 {
    let normal = Vector3::new(nx, ny, nz);
    let origin = normal * offset;
    let (u, v) = if nx != 0.0 {
        (Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 0.0, 1.0))
    } else if ny != 0.0 {
        (Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0))
    } else {
        (Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0))
    };
    let p00 = origin;
    let p10 = origin + u;
    let p01 = origin + v;
    let p11 = origin + u + v;

    let tri_flux = |a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>| {
        let cross = (b - a).cross(c - a);
        a.dot(cross) / 6.0
    };
    tri_flux(p00, p10, p11) + tri_flux(p00, p11, p01)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fully_inside_cell_has_volume_one() {
        let field = [-1.0; 8];
        let v = get_cell_volume(field);
        assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn fully_outside_cell_has_volume_zero() {
        let field = [1.0; 8];
        let v = get_cell_volume(field);
        assert_abs_diff_eq!(v, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn fraction_clamps_to_unit_interval() {
        assert_eq!(fraction(1.0, 1.0 - 1e9), 0.0_f64.max(fraction(1.0, 1.0 - 1e9)));
        assert!(fraction(-1.0, 1.0) >= 0.0 && fraction(-1.0, 1.0) <= 1.0);
    }
}
