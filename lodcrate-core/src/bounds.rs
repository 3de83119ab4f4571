//! Approximate bounding spheres
//!
//! Neither routine computes a minimal sphere. Clusters use Ritter's
//! expand-and-recenter pass; groups of spheres are covered from a given
//! center outward.

use crate::mesh::BoundingSphere;
use crate::point::Point3f;

/// Ritter-style sphere around `points`.
///
/// Starts from the two points with extreme x, grows towards every outlier
/// while shifting the center, then widens the radius to the farthest point so
/// rounding never leaves a point outside.
pub fn ritter_sphere(points: &[Point3f]) -> BoundingSphere {
    let Some(first) = points.first() else {
        return BoundingSphere::default();
    };

    let mut min_x = first;
    let mut max_x = first;
    for p in points {
        if p.x < min_x.x {
            min_x = p;
        }
        if p.x > max_x.x {
            max_x = p;
        }
    }

    let mut center = nalgebra::center(min_x, max_x);
    let mut radius = (max_x - min_x).norm() * 0.5;

    for p in points {
        let offset = p - center;
        let distance = offset.norm();
        if distance > radius {
            let new_radius = (radius + distance) * 0.5;
            center += offset * ((new_radius - radius) / distance);
            radius = new_radius;
        }
    }

    for p in points {
        radius = radius.max((p - center).norm());
    }

    BoundingSphere::new(center, radius)
}

/// Smallest sphere centered at `center` that covers every sphere in `spheres`.
pub fn enclose_spheres<'a, I>(center: Point3f, spheres: I) -> BoundingSphere
where
    I: IntoIterator<Item = &'a BoundingSphere>,
{
    let radius = spheres
        .into_iter()
        .map(|s| (s.center - center).norm() + s.radius)
        .fold(0.0f32, f32::max);
    BoundingSphere::new(center, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_points() {
        let sphere = ritter_sphere(&[]);
        assert_eq!(sphere.radius, 0.0);
    }

    #[test]
    fn test_single_point() {
        let p = Point3f::new(1.0, 2.0, 3.0);
        let sphere = ritter_sphere(&[p]);
        assert_eq!(sphere.center, p);
        assert_eq!(sphere.radius, 0.0);
    }

    #[test]
    fn test_segment_is_tight() {
        let sphere = ritter_sphere(&[Point3f::new(-1.0, 0.0, 0.0), Point3f::new(1.0, 0.0, 0.0)]);
        assert_relative_eq!(sphere.center, Point3f::origin());
        assert_relative_eq!(sphere.radius, 1.0);
    }

    #[test]
    fn test_contains_all_points() {
        let points: Vec<Point3f> = (0..50)
            .map(|i| {
                let a = i as f32 * 0.7;
                Point3f::new(a.cos() * 3.0, a.sin() * 2.0, (i % 7) as f32 - 3.0)
            })
            .collect();
        let sphere = ritter_sphere(&points);
        for p in &points {
            assert!(sphere.contains_point(p, 1e-5));
        }
    }

    #[test]
    fn test_enclose_spheres() {
        let children = [
            BoundingSphere::new(Point3f::new(2.0, 0.0, 0.0), 1.0),
            BoundingSphere::new(Point3f::new(-1.0, 0.0, 0.0), 0.5),
        ];
        let parent = enclose_spheres(Point3f::origin(), &children);
        assert_relative_eq!(parent.radius, 3.0);
        for child in &children {
            assert!(parent.contains_sphere(child, 1e-6));
        }
    }
}
