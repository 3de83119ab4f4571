//! Quadric error metrics
//!
//! Each vertex accumulates the fundamental quadrics of the planes of its
//! incident triangles. The squared distance of a point to all those planes
//! is `v^T Q v` with `v = (x, y, z, 1)`.

use lodcrate_core::Point3f;
use nalgebra::{Matrix4, Vector4};

pub type Quadric = Matrix4<f64>;

/// Plane `(a, b, c, d)` with unit normal through a triangle, or the z = 0
/// plane when the triangle is degenerate.
pub fn triangle_plane(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Vector4<f64> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let n = e1.cross(&e2).normalize();
    if !n.iter().all(|x| x.is_finite()) {
        return Vector4::new(0.0, 0.0, 1.0, 0.0);
    }
    let d = -n.dot(&v0.coords);
    Vector4::new(n.x as f64, n.y as f64, n.z as f64, d as f64)
}

pub fn plane_to_quadric(p: &Vector4<f64>) -> Quadric {
    p * p.transpose()
}

/// Quadric of the plane through a triangle; zero for degenerate triangles
pub fn triangle_quadric(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Quadric {
    if (v1 - v0).cross(&(v2 - v0)).norm_squared() <= f32::MIN_POSITIVE {
        return Quadric::zeros();
    }
    plane_to_quadric(&triangle_plane(v0, v1, v2))
}

/// Sum of squared plane distances of `p`, clamped at zero
pub fn quadric_cost(q: &Quadric, p: &Point3f) -> f64 {
    let vh = Vector4::new(p.x as f64, p.y as f64, p.z as f64, 1.0);
    (vh.transpose() * q * vh)[0].max(0.0)
}

/// Position minimizing `q` for the collapse of edge `a`-`b` and its cost.
///
/// Solves the 3x3 system when it is invertible; the endpoints and the
/// midpoint are always considered too, so an ill-conditioned solve never
/// wins over a cheaper simple candidate.
pub fn optimal_position(q: &Quadric, a: &Point3f, b: &Point3f) -> (Point3f, f64) {
    let mut candidates = vec![*a, *b, nalgebra::center(a, b)];

    let q3 = q.fixed_view::<3, 3>(0, 0);
    let q1 = q.fixed_view::<3, 1>(0, 3);
    if let Some(inv) = q3.try_inverse() {
        let p = -inv * q1;
        let solved = Point3f::new(p[0] as f32, p[1] as f32, p[2] as f32);
        if solved.coords.iter().all(|x| x.is_finite()) {
            candidates.insert(0, solved);
        }
    }

    candidates
        .into_iter()
        .map(|p| (p, quadric_cost(q, &p)))
        .min_by(|x, y| x.1.total_cmp(&y.1))
        .unwrap_or((*a, 0.0))
}
