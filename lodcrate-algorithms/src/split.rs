//! Subdivision of coarse clusters into micronodes of finer clusters

use crate::clustering::{apply_clustering, proximity_weight};
use crate::micronodes::build_micronodes_from_partition;
use crate::partition::{densify_parts, partition_kway, GraphBuilder};
use lodcrate_core::{Error, Index, LevelMesh, Point3f, Result};
use tracing::debug;

/// Partitions the triangles `range` of `level` into `parts` pieces using only
/// adjacency inside the range. Returns local part ids and the part count.
fn partition_range(
    level: &LevelMesh,
    centroids: &[Point3f],
    range: std::ops::Range<usize>,
    parts: usize,
) -> Result<(Vec<Index>, usize)> {
    let start = range.start;
    let mut builder = GraphBuilder::new(range.len());
    for t in range.clone() {
        for other in level.adjacency[t].neighbors() {
            let o = other as usize;
            if o > t && range.contains(&o) {
                let distance = (centroids[t] - centroids[o]).norm();
                builder.add_edge(
                    (t - start) as Index,
                    (o - start) as Index,
                    proximity_weight(distance),
                );
            }
        }
    }
    let mut local = partition_kway(&builder.build(), parts)?;
    let local_len = local.len();
    let count = densify_parts(&mut local, parts.max(local_len));
    Ok((local, count))
}

/// Splits every cluster of `level` into up to `clusters_per_node`
/// sub-clusters of about `sub_cluster_size` triangles and turns each
/// original cluster into one micronode over its sub-clusters.
///
/// Returns the number of micronodes, which equals the original cluster count.
pub fn split_clusters(
    level: &mut LevelMesh,
    sub_cluster_size: usize,
    clusters_per_node: usize,
) -> Result<usize> {
    let coarse = level.clusters.to_vec();
    if coarse.is_empty() {
        return Err(Error::IntegrityViolation(format!(
            "level {} has no clusters to split",
            level.level
        )));
    }
    let sub_cluster_size = sub_cluster_size.max(1);
    let centroids = level.triangle_centroids();

    let mut assignment = vec![0 as Index; level.triangle_count()];
    let mut node_of_cluster: Vec<Index> = Vec::new();
    for (node, cluster) in coarse.iter().enumerate() {
        let range = cluster.triangle_range();
        let parts = range
            .len()
            .div_ceil(sub_cluster_size)
            .clamp(1, clusters_per_node.max(1));
        let (local, produced) = partition_range(level, &centroids, range.clone(), parts)?;

        let base = node_of_cluster.len() as Index;
        for (t, part) in range.zip(local) {
            assignment[t] = base + part;
        }
        node_of_cluster.extend(std::iter::repeat(node as Index).take(produced));
    }

    let sub_clusters = node_of_cluster.len();
    apply_clustering(level, &assignment, sub_clusters)?;
    let count = build_micronodes_from_partition(level, &node_of_cluster, coarse.len())?;
    debug!(
        level = level.level,
        coarse = coarse.len(),
        sub_clusters,
        "clusters split into micronodes"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{build_clusters, ClusteringStrategy};
    use crate::fixtures::make_curved_surface;
    use crate::refine::RefinementParams;

    #[test]
    fn test_split_into_four() -> Result<()> {
        let mut level = make_curved_surface(17)?;
        let coarse = build_clusters(
            &mut level,
            128,
            ClusteringStrategy::GraphPartition,
            &RefinementParams::default(),
        )?;
        let count = split_clusters(&mut level, 32, 4)?;

        assert_eq!(count, coarse);
        assert_eq!(level.micronode_count(), coarse);
        level.validate()?;
        assert!(level.cluster_count() > coarse);
        assert!(level.cluster_count() <= coarse * 4);
        for node in &level.micronodes {
            assert!((1..=4).contains(&node.cluster_count()));
        }
        Ok(())
    }

    #[test]
    fn test_small_cluster_stays_whole() -> Result<()> {
        let mut level = make_curved_surface(3)?;
        build_clusters(
            &mut level,
            8,
            ClusteringStrategy::Greedy,
            &RefinementParams::default(),
        )?;
        assert_eq!(level.cluster_count(), 1);
        split_clusters(&mut level, 32, 4)?;
        assert_eq!(level.cluster_count(), 1);
        assert_eq!(level.micronodes[0].cluster_ids, vec![0]);
        Ok(())
    }

    #[test]
    fn test_micronode_members_are_contiguous() -> Result<()> {
        let mut level = make_curved_surface(13)?;
        build_clusters(
            &mut level,
            40,
            ClusteringStrategy::Greedy,
            &RefinementParams::default(),
        )?;
        split_clusters(&mut level, 10, 4)?;
        let mut next = 0;
        for node in &level.micronodes {
            for &c in &node.cluster_ids {
                assert_eq!(c, next);
                next += 1;
            }
        }
        assert_eq!(next as usize, level.cluster_count());
        Ok(())
    }
}
