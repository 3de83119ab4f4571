//! Per-position vertex normals
//!
//! Normals are accumulated from unnormalized face normals, so each triangle
//! contributes proportionally to its area.

use lodcrate_core::{face_normal, Index, LevelMesh, Point3f, Result, Triangle, Vector3f, Wedge};
use tracing::debug;

/// Normal used for positions no triangle with nonzero area touches
pub const FALLBACK_NORMAL: Vector3f = Vector3f::new(0.0, 0.0, 1.0);

/// Area-weighted normal for every position, in position order.
pub fn compute_position_normals(
    positions: &[Point3f],
    wedges: &[Wedge],
    triangles: &[Triangle],
) -> Vec<Vector3f> {
    let mut accumulated = vec![Vector3f::zeros(); positions.len()];
    for triangle in triangles {
        let p: [Index; 3] = triangle.w.map(|w| wedges[w as usize].p);
        let [a, b, c] = p.map(|i| positions[i as usize]);
        let n = face_normal(&a, &b, &c);
        if !n.iter().all(|v| v.is_finite()) {
            continue;
        }
        for i in p {
            accumulated[i as usize] += n;
        }
    }

    accumulated
        .into_iter()
        .map(|n| n.try_normalize(1e-12).unwrap_or(FALLBACK_NORMAL))
        .collect()
}

/// Replaces the normals of `level` with one area-weighted normal per
/// position and points every wedge at the normal of its position.
pub fn recompute_normals(level: &mut LevelMesh) -> Result<()> {
    let normals = compute_position_normals(&level.positions, &level.wedges, &level.triangles);
    level.normals.assign(&normals)?;
    for wedge in level.wedges.iter_mut() {
        wedge.n = wedge.p;
    }
    debug!(level = level.level, normals = normals.len(), "normals recomputed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{make_curved_surface, make_quad};
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_quad_faces_up() -> Result<()> {
        let mut level = make_quad()?;
        recompute_normals(&mut level)?;
        assert_eq!(level.normals.len(), 4);
        for n in level.normals.iter() {
            assert_relative_eq!(*n, Vector3f::new(0.0, 0.0, 1.0), epsilon = 1e-6);
        }
        for (i, w) in level.wedges.iter().enumerate() {
            assert_eq!(w.n as usize, i);
        }
        Ok(())
    }

    #[test]
    fn test_normals_are_unit_length() -> Result<()> {
        let mut level = make_curved_surface(8)?;
        recompute_normals(&mut level)?;
        for n in level.normals.iter() {
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_larger_faces_dominate() {
        // A big triangle in z = 0 and a tiny one tilted towards +x share position 0
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(10.0, 0.0, 0.0),
            Point3f::new(0.0, 10.0, 0.0),
            Point3f::new(0.0, 0.0, 0.1),
            Point3f::new(0.0, 0.1, 0.0),
        ];
        let wedges: Vec<Wedge> = (0..5).map(Wedge::position_only).collect();
        let triangles = vec![Triangle::new(0, 1, 2), Triangle::new(0, 4, 3)];
        let normals = compute_position_normals(&positions, &wedges, &triangles);
        assert!(normals[0].z > 0.99);
        assert_relative_eq!(normals[3], Vector3f::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_unreferenced_and_degenerate_use_fallback() {
        let positions = vec![Point3f::new(0.0, 0.0, 0.0); 4];
        let wedges: Vec<Wedge> = (0..4).map(Wedge::position_only).collect();
        let normals = compute_position_normals(&positions, &wedges, &[Triangle::new(0, 1, 2)]);
        assert!(normals.iter().all(|&n| n == FALLBACK_NORMAL));
    }
}
