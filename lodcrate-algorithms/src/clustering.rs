//! Triangle clustering
//!
//! Two interchangeable strategies assign every triangle of a level to a
//! cluster: greedy region growing over the adjacency and a k-way graph
//! partition. Both are refined and then handed to [`apply_clustering`],
//! which reorders the level into contiguous per-cluster runs.

use crate::adjacency::build_adjacency;
use crate::partition::{densify_parts, partition_kway, GraphBuilder, WeightedGraph};
use crate::refine::{refine_partition, RefinementParams};
use lodcrate_core::{
    ritter_sphere, Cluster, Error, FaceAdjacency, Index, LevelMesh, Point3f, Remap, Result,
    Vector3f, NONE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Penalty per unit of distance to the growing region's centroid
pub const GREEDY_DISTANCE_WEIGHT: f32 = 0.05;

/// How triangles (and, one level up, clusters) are grouped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusteringStrategy {
    /// Region growing with a hard size bound
    Greedy,
    /// METIS k-way partition of the weighted adjacency graph
    #[default]
    GraphPartition,
}

// ============================================================
// Graphs
// ============================================================

/// Unit weight per shared edge
pub fn topology_graph(adjacency: &[FaceAdjacency]) -> WeightedGraph {
    let mut builder = GraphBuilder::new(adjacency.len());
    for (t, adj) in adjacency.iter().enumerate() {
        for other in adj.neighbors() {
            if (t as Index) < other {
                builder.add_edge(t as Index, other, 1);
            }
        }
    }
    builder.build()
}

/// Edge weight that favours keeping nearby triangles together
pub fn proximity_weight(distance: f32) -> i32 {
    let weight = 1000.0 / (1.0 + distance);
    if weight.is_finite() {
        weight.max(1.0) as i32
    } else {
        1
    }
}

/// Shared edges weighted by centroid proximity
pub fn proximity_graph(adjacency: &[FaceAdjacency], centroids: &[Point3f]) -> WeightedGraph {
    let mut builder = GraphBuilder::new(adjacency.len());
    for (t, adj) in adjacency.iter().enumerate() {
        for other in adj.neighbors() {
            if (t as Index) < other {
                let distance = (centroids[t] - centroids[other as usize]).norm();
                builder.add_edge(t as Index, other, proximity_weight(distance));
            }
        }
    }
    builder.build()
}

// ============================================================
// Greedy region growing
// ============================================================

/// Grows regions of at most `max_size` items over `graph`.
///
/// Seeds come from the front of items left over by earlier regions (lowest
/// index first), or from a linear scan when the front is exhausted. Each
/// step adds the candidate with the highest
/// `shared weight - 0.05 * distance to the running centroid`.
/// Returns the assignment and the number of regions.
pub fn grow_regions(
    graph: &WeightedGraph,
    centroids: &[Point3f],
    max_size: usize,
) -> (Vec<Index>, usize) {
    let n = graph.vertex_count();
    let max_size = max_size.max(1);
    let mut assignment = vec![NONE; n];
    let mut front: BTreeSet<Index> = BTreeSet::new();
    let mut scan = 0usize;
    let mut region: Index = 0;

    loop {
        let mut seed = None;
        while let Some(candidate) = front.pop_first() {
            if assignment[candidate as usize] == NONE {
                seed = Some(candidate);
                break;
            }
        }
        if seed.is_none() {
            while scan < n && assignment[scan] != NONE {
                scan += 1;
            }
            if scan < n {
                seed = Some(scan as Index);
            }
        }
        let Some(seed) = seed else {
            break;
        };

        assignment[seed as usize] = region;
        let mut size = 1usize;
        let mut sum: Vector3f = centroids[seed as usize].coords;
        let mut candidates: BTreeSet<Index> = graph
            .neighbors(seed as usize)
            .map(|(o, _)| o)
            .filter(|&o| assignment[o as usize] == NONE)
            .collect();

        while size < max_size && !candidates.is_empty() {
            let center = Point3f::from(sum / size as f32);
            let mut best: Option<(f32, Index)> = None;
            for &c in &candidates {
                let shared: i32 = graph
                    .neighbors(c as usize)
                    .filter(|&(o, _)| assignment[o as usize] == region)
                    .map(|(_, w)| w)
                    .sum();
                let score = shared as f32
                    - GREEDY_DISTANCE_WEIGHT * (centroids[c as usize] - center).norm();
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, c));
                }
            }
            let Some((_, next)) = best else {
                break;
            };

            candidates.remove(&next);
            assignment[next as usize] = region;
            size += 1;
            sum += centroids[next as usize].coords;
            for (o, _) in graph.neighbors(next as usize) {
                if assignment[o as usize] == NONE {
                    candidates.insert(o);
                }
            }
        }

        front.extend(candidates);
        region += 1;
    }

    (assignment, region as usize)
}

// ============================================================
// Statistics
// ============================================================

/// Size distribution of a partition
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStats {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f32,
    /// Eight equal-width bins between `min` and `max`
    pub histogram: [usize; 8],
}

impl ClusterStats {
    pub fn from_sizes(sizes: &[usize]) -> Self {
        let min = sizes.iter().copied().min().unwrap_or(0);
        let max = sizes.iter().copied().max().unwrap_or(0);
        let mean = if sizes.is_empty() {
            0.0
        } else {
            sizes.iter().sum::<usize>() as f32 / sizes.len() as f32
        };
        let mut histogram = [0usize; 8];
        let width = (max - min) as f32 / 8.0;
        for &s in sizes {
            let bin = if width > 0.0 {
                (((s - min) as f32 / width) as usize).min(7)
            } else {
                0
            };
            histogram[bin] += 1;
        }
        Self {
            count: sizes.len(),
            min,
            max,
            mean,
            histogram,
        }
    }

    pub fn from_assignment(assignment: &[Index], parts: usize) -> Self {
        Self::from_sizes(&part_sizes(assignment, parts))
    }

    fn log(&self, stage: &str) {
        debug!(
            stage,
            count = self.count,
            min = self.min,
            max = self.max,
            mean = self.mean,
            histogram = ?self.histogram,
            "cluster sizes"
        );
    }
}

pub fn part_sizes(assignment: &[Index], parts: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; parts];
    for &p in assignment {
        sizes[p as usize] += 1;
    }
    sizes
}

// ============================================================
// Post-processing
// ============================================================

/// Reorders the triangles of `level` into contiguous runs per cluster and
/// rebuilds clusters, adjacency, material ids and the triangle to cluster
/// map. Within a cluster the previous triangle order is kept.
///
/// Every cluster in `0..cluster_count` must receive at least one triangle.
/// Existing micronodes are discarded. Returns the old-to-new triangle map.
pub fn apply_clustering(
    level: &mut LevelMesh,
    assignment: &[Index],
    cluster_count: usize,
) -> Result<Remap> {
    let n = level.triangle_count();
    if assignment.len() != n {
        return Err(Error::IntegrityViolation(format!(
            "{} cluster assignments for {} triangles",
            assignment.len(),
            n
        )));
    }
    if let Some(&bad) = assignment.iter().find(|&&c| c as usize >= cluster_count) {
        return Err(Error::IntegrityViolation(format!(
            "triangle assigned to cluster {} of {}",
            bad, cluster_count
        )));
    }
    let sizes = part_sizes(assignment, cluster_count);
    if let Some(empty) = sizes.iter().position(|&s| s == 0) {
        return Err(Error::IntegrityViolation(format!(
            "cluster {} has no triangles",
            empty
        )));
    }

    // Stable scatter by cluster
    let mut offsets = Vec::with_capacity(cluster_count);
    let mut running = 0usize;
    for &size in &sizes {
        offsets.push(running);
        running += size;
    }
    let mut cursor = offsets.clone();
    let mut order = vec![0 as Index; n];
    for (old, &c) in assignment.iter().enumerate() {
        order[cursor[c as usize]] = old as Index;
        cursor[c as usize] += 1;
    }
    let remap = Remap::from_new_order(&order, n);

    let triangles = remap.gather(&level.triangles);
    let adjacency: Vec<FaceAdjacency> = remap
        .gather(&level.adjacency)
        .iter()
        .map(|a| remap.apply_to_adjacency(a))
        .collect();
    level.triangles.assign(&triangles)?;
    level.adjacency.assign(&adjacency)?;
    if level.attributes.has_materials {
        let material_ids = remap.gather(&level.material_ids);
        level.material_ids.assign(&material_ids)?;
    }

    let mut clusters = Vec::with_capacity(cluster_count);
    let mut triangle_to_cluster = Vec::with_capacity(n);
    for (c, (&offset, &size)) in offsets.iter().zip(&sizes).enumerate() {
        let mut corners = Vec::with_capacity(size * 3);
        for t in offset..offset + size {
            corners.extend_from_slice(&level.triangle_corners(t));
            triangle_to_cluster.push(c as Index);
        }
        clusters.push(Cluster {
            triangle_offset: offset as Index,
            triangle_count: size as Index,
            sphere: ritter_sphere(&corners),
            source_node: NONE,
        });
    }
    level.clusters.assign(&clusters)?;
    level.triangle_to_cluster.assign(&triangle_to_cluster)?;
    level.micronodes.clear();
    Ok(remap)
}

// ============================================================
// Entry point
// ============================================================

/// Partitions the triangles of `level` into clusters of about
/// `max_triangles` and reorders the level accordingly.
///
/// Under [`ClusteringStrategy::Greedy`] every cluster holds at most
/// `max_triangles` triangles. The graph strategy only targets that size.
/// Adjacency is computed first when missing. Returns the cluster count.
pub fn build_clusters(
    level: &mut LevelMesh,
    max_triangles: usize,
    strategy: ClusteringStrategy,
    refinement: &RefinementParams,
) -> Result<usize> {
    if max_triangles == 0 {
        return Err(Error::Configuration(
            "cluster budget must be at least one triangle".to_string(),
        ));
    }
    let n = level.triangle_count();
    if n == 0 {
        level.clusters.clear();
        level.triangle_to_cluster.clear();
        level.micronodes.clear();
        return Ok(0);
    }
    if level.adjacency.len() != n {
        build_adjacency(level)?;
    }

    let centroids = level.triangle_centroids();
    let topology = topology_graph(&level.adjacency);

    let (mut assignment, count, size_cap) = match strategy {
        ClusteringStrategy::Greedy => {
            let (assignment, count) = grow_regions(&topology, &centroids, max_triangles);
            (assignment, count, max_triangles)
        }
        ClusteringStrategy::GraphPartition => {
            let parts = n.div_ceil(max_triangles).max(2).min(n);
            let graph = proximity_graph(&level.adjacency, &centroids);
            let mut assignment = partition_kway(&graph, parts)?;
            let count = densify_parts(&mut assignment, parts);
            let largest = part_sizes(&assignment, count).into_iter().max().unwrap_or(1);
            (assignment, count, largest)
        }
    };

    ClusterStats::from_assignment(&assignment, count).log("initial");
    let report = refine_partition(
        &topology,
        &centroids,
        &mut assignment,
        count,
        size_cap,
        refinement,
    );
    if report.moves > 0 {
        ClusterStats::from_assignment(&assignment, count).log("refined");
    }

    apply_clustering(level, &assignment, count)?;
    debug!(
        level = level.level,
        clusters = count,
        ?strategy,
        moves = report.moves,
        "triangles clustered"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{make_curved_surface, make_plane_grid, make_quad};
    use lodcrate_core::ErrorKind;

    fn assert_partition(level: &LevelMesh, count: usize) {
        assert_eq!(level.cluster_count(), count);
        level.validate().expect("clustered level must validate");
    }

    // ---- Scenario tests ----

    #[test]
    fn test_quad_one_triangle_per_cluster() -> Result<()> {
        for strategy in [ClusteringStrategy::Greedy, ClusteringStrategy::GraphPartition] {
            let mut level = make_quad()?;
            let count = build_clusters(&mut level, 1, strategy, &RefinementParams::default())?;
            assert_eq!(count, 2);
            assert_partition(&level, 2);
            for cluster in level.clusters.iter() {
                assert_eq!(cluster.triangle_count, 1);
                assert_eq!(cluster.source_node, NONE);
            }
        }
        Ok(())
    }

    // ---- Greedy tests ----

    #[test]
    fn test_greedy_size_bound() -> Result<()> {
        for budget in [1, 5, 16, 40] {
            let mut level = make_curved_surface(12)?;
            let count = build_clusters(
                &mut level,
                budget,
                ClusteringStrategy::Greedy,
                &RefinementParams::default(),
            )?;
            assert_partition(&level, count);
            assert!(level
                .clusters
                .iter()
                .all(|c| c.triangle_count as usize <= budget));
            assert!(count >= level.triangle_count().div_ceil(budget));
        }
        Ok(())
    }

    #[test]
    fn test_greedy_regions_are_compact() -> Result<()> {
        let mut level = make_plane_grid(9)?;
        build_adjacency(&mut level)?;
        let graph = topology_graph(&level.adjacency);
        let (assignment, count) = grow_regions(&graph, &level.triangle_centroids(), 16);
        assert_eq!(assignment.len(), 128);
        assert!(assignment.iter().all(|&a| a != NONE));
        // A plane of 128 triangles should need not much more than 8 regions of 16
        assert!((8..=24).contains(&count), "{} regions", count);
        Ok(())
    }

    #[test]
    fn test_greedy_disconnected_items() {
        let graph = GraphBuilder::new(5).build();
        let centroids = vec![Point3f::origin(); 5];
        let (assignment, count) = grow_regions(&graph, &centroids, 3);
        assert_eq!(count, 5);
        assert_eq!(assignment, vec![0, 1, 2, 3, 4]);
    }

    // ---- Graph partition tests ----

    #[test]
    fn test_graph_partition_balanced() -> Result<()> {
        let mut level = make_curved_surface(17)?;
        let n = level.triangle_count();
        let count = build_clusters(
            &mut level,
            64,
            ClusteringStrategy::GraphPartition,
            &RefinementParams::default(),
        )?;
        assert_partition(&level, count);
        assert!(count <= n.div_ceil(64));
        let stats = ClusterStats::from_sizes(
            &level
                .clusters
                .iter()
                .map(|c| c.triangle_count as usize)
                .collect::<Vec<_>>(),
        );
        let expected = n as f32 / count as f32;
        assert!((stats.mean - expected).abs() < 1e-3);
        assert!(stats.max as f32 <= expected * 1.5, "{:?}", stats);
        Ok(())
    }

    #[test]
    fn test_edgeless_mesh_graph_partition_fails() -> Result<()> {
        // Four separate triangles
        let mut positions = Vec::new();
        let mut faces = Vec::new();
        for i in 0..4u32 {
            let x = i as f32 * 10.0;
            positions.push(Point3f::new(x, 0.0, 0.0));
            positions.push(Point3f::new(x + 1.0, 0.0, 0.0));
            positions.push(Point3f::new(x, 1.0, 0.0));
            faces.push([i * 3, i * 3 + 1, i * 3 + 2]);
        }
        let mesh = lodcrate_core::IngestedMesh::from_indexed(positions, &faces);
        let mut level =
            LevelMesh::from_ingested(&lodcrate_core::LevelStorage::Temporary, &mesh)?;
        let err = build_clusters(
            &mut level,
            2,
            ClusteringStrategy::GraphPartition,
            &RefinementParams::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphPartitionFailure);

        // Greedy copes by making one cluster per island
        let count = build_clusters(
            &mut level,
            2,
            ClusteringStrategy::Greedy,
            &RefinementParams::default(),
        )?;
        assert_eq!(count, 4);
        Ok(())
    }

    // ---- Post-processing tests ----

    #[test]
    fn test_reorder_keeps_geometry_and_spheres() -> Result<()> {
        let mut level = make_curved_surface(6)?;
        build_adjacency(&mut level)?;
        let before: Vec<[Point3f; 3]> = (0..level.triangle_count())
            .map(|t| level.triangle_corners(t))
            .collect();
        let assignment: Vec<Index> = (0..level.triangle_count() as Index).map(|t| t % 3).collect();
        let remap = apply_clustering(&mut level, &assignment, 3)?;

        assert_partition(&level, 3);
        for (old, corners) in before.iter().enumerate() {
            let new = remap.apply(old as Index) as usize;
            assert_eq!(&level.triangle_corners(new), corners);
            assert_eq!(level.triangle_to_cluster[new], assignment[old]);
        }
        for cluster in level.clusters.iter() {
            for t in cluster.triangle_range() {
                for p in level.triangle_corners(t) {
                    assert!(cluster.sphere.contains_point(&p, 1e-4));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_empty_cluster_rejected() -> Result<()> {
        let mut level = make_quad()?;
        build_adjacency(&mut level)?;
        let err = apply_clustering(&mut level, &[0, 0], 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityViolation);
        Ok(())
    }

    #[test]
    fn test_stats_histogram() {
        let stats = ClusterStats::from_sizes(&[1, 2, 9, 9]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 9);
        assert_eq!(stats.histogram[0], 1);
        assert_eq!(stats.histogram[7], 2);
        assert_eq!(stats.histogram.iter().sum::<usize>(), 4);
    }

    #[test]
    fn test_proximity_weight_bounds() {
        assert_eq!(proximity_weight(0.0), 1000);
        assert_eq!(proximity_weight(1e9), 1);
        assert_eq!(proximity_weight(f32::NAN), 1);
    }
}
