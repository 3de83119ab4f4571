//! Bottom-up saturation of micronode errors and bounding spheres
//!
//! After the pass every micronode's error is at least its children's error
//! and its sphere encloses theirs, so a renderer can cut the hierarchy
//! anywhere without popping.

use lodcrate_core::{Index, LevelMesh, MicroNode, NONE};
use std::collections::BTreeSet;
use tracing::debug;

/// Margin applied to child errors and saturated radii
pub const SATURATION_MARGIN: f32 = 1.01;

/// Distinct micronodes of the finer level that produced `node`'s clusters,
/// in ascending order. Empty at level 0.
pub fn source_micronodes(level: &LevelMesh, node: &MicroNode) -> Vec<Index> {
    node.cluster_ids
        .iter()
        .map(|&c| level.clusters[c as usize].source_node)
        .filter(|&s| s != NONE)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaturationReport {
    pub raised_errors: usize,
    pub widened_spheres: usize,
}

/// Saturates levels `1..` in order, each against the already saturated
/// level below it.
pub fn saturate_levels(levels: &mut [LevelMesh]) -> SaturationReport {
    let mut report = SaturationReport::default();
    for l in 1..levels.len() {
        let (finer, coarser) = levels.split_at_mut(l);
        let finer = &finer[l - 1];
        let level = &mut coarser[0];

        let children: Vec<Vec<Index>> = level
            .micronodes
            .iter()
            .map(|node| source_micronodes(level, node))
            .collect();

        for (node, children) in level.micronodes.iter_mut().zip(children) {
            if children.is_empty() {
                continue;
            }
            let mut error = node.error;
            let mut radius = node.sphere.radius;
            for &c in &children {
                let child = &finer.micronodes[c as usize];
                error = error.max(child.error * SATURATION_MARGIN);
                let reach = (child.sphere.center - node.sphere.center).norm() + child.sphere.radius;
                radius = radius.max(reach);
            }
            let radius = radius * SATURATION_MARGIN;

            if error > node.error {
                report.raised_errors += 1;
            }
            if radius > node.sphere.radius {
                report.widened_spheres += 1;
            }
            node.error = error;
            node.sphere.radius = radius;
        }
    }
    debug!(
        raised_errors = report.raised_errors,
        widened_spheres = report.widened_spheres,
        "hierarchy saturated"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lodcrate_core::{BoundingSphere, Cluster, LevelStorage, Point3f, Result};

    fn node(clusters: Vec<Index>, center: Point3f, radius: f32, error: f32) -> MicroNode {
        let mut node = MicroNode::new(clusters);
        node.sphere = BoundingSphere::new(center, radius);
        node.centroid = center;
        node.error = error;
        node
    }

    fn two_levels() -> Result<Vec<LevelMesh>> {
        let storage = LevelStorage::Temporary;
        let mut fine = LevelMesh::create(&storage, 0)?;
        fine.clusters.assign(&[Cluster::default(), Cluster::default()])?;
        fine.micronodes = vec![
            node(vec![0], Point3f::new(0.0, 0.0, 0.0), 1.0, 2.0),
            node(vec![1], Point3f::new(4.0, 0.0, 0.0), 1.0, 1.0),
        ];

        let mut coarse = LevelMesh::create(&storage, 1)?;
        coarse.clusters.assign(&[
            Cluster {
                source_node: 0,
                ..Default::default()
            },
            Cluster {
                source_node: 1,
                ..Default::default()
            },
        ])?;
        coarse.micronodes = vec![node(vec![0, 1], Point3f::new(2.0, 0.0, 0.0), 1.0, 0.0)];
        Ok(vec![fine, coarse])
    }

    #[test]
    fn test_source_micronodes() -> Result<()> {
        let levels = two_levels()?;
        assert!(source_micronodes(&levels[0], &levels[0].micronodes[0]).is_empty());
        assert_eq!(
            source_micronodes(&levels[1], &levels[1].micronodes[0]),
            vec![0, 1]
        );
        Ok(())
    }

    #[test]
    fn test_root_dominates_children() -> Result<()> {
        let mut levels = two_levels()?;
        let report = saturate_levels(&mut levels);
        assert_eq!(report.raised_errors, 1);
        assert_eq!(report.widened_spheres, 1);

        let root = &levels[1].micronodes[0];
        assert_relative_eq!(root.error, 2.0 * SATURATION_MARGIN);
        assert_relative_eq!(root.sphere.radius, 3.0 * SATURATION_MARGIN);
        for child in &levels[0].micronodes {
            assert!(root.sphere.contains_sphere(&child.sphere, 0.0));
            assert!(root.error >= child.error);
        }
        // Level 0 is never touched
        assert_eq!(levels[0].micronodes[0].error, 2.0);
        Ok(())
    }

    #[test]
    fn test_single_level_is_untouched() -> Result<()> {
        let mut levels = two_levels()?;
        levels.truncate(1);
        assert_eq!(saturate_levels(&mut levels), SaturationReport::default());
        Ok(())
    }
}
