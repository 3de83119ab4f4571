//! Grouping clusters into micronodes
//!
//! The same two strategies used for triangles run one level up, over a graph
//! whose vertices are clusters and whose edge weights count the triangle
//! edges two clusters share.

use crate::clustering::{grow_regions, part_sizes, ClusteringStrategy};
use crate::partition::{densify_parts, partition_kway, GraphBuilder, WeightedGraph};
use lodcrate_core::{
    enclose_spheres, Error, Index, LevelMesh, MicroNode, Point3f, Result, Vector3f,
};
use tracing::debug;

/// Cluster adjacency weighted by shared triangle edges
pub fn cluster_graph(level: &LevelMesh) -> WeightedGraph {
    let mut builder = GraphBuilder::new(level.cluster_count());
    let triangle_to_cluster = level.triangle_to_cluster.as_slice();
    for (t, adj) in level.adjacency.iter().enumerate() {
        let a = triangle_to_cluster[t];
        for other in adj.neighbors() {
            let b = triangle_to_cluster[other as usize];
            if a < b {
                builder.add_edge(a, b, 1);
            }
        }
    }
    builder.build()
}

/// Bounding sphere centers of the clusters
pub fn cluster_centers(level: &LevelMesh) -> Vec<Point3f> {
    level.clusters.iter().map(|c| c.sphere.center).collect()
}

/// Fills the triangle count, weighted centroid and enclosing sphere of `node`
/// from its clusters.
pub fn update_micronode_bounds(level: &LevelMesh, node: &mut MicroNode) {
    let mut triangles = 0u32;
    let mut weighted = Vector3f::zeros();
    for &c in &node.cluster_ids {
        let cluster = &level.clusters[c as usize];
        triangles += cluster.triangle_count;
        weighted += cluster.sphere.center.coords * cluster.triangle_count as f32;
    }
    node.triangle_count = triangles;
    node.centroid = Point3f::from(weighted / triangles.max(1) as f32);
    let clusters = level.clusters.as_slice();
    node.sphere = enclose_spheres(
        node.centroid,
        node.cluster_ids.iter().map(|&c| &clusters[c as usize].sphere),
    );
}

/// Number of micronodes to aim for. Never zero.
pub fn micronode_target(cluster_count: usize, clusters_per_node: usize, cap: Option<usize>) -> usize {
    cluster_count
        .div_ceil(clusters_per_node.max(1))
        .min(cap.unwrap_or(usize::MAX))
        .max(1)
}

/// Installs micronodes from `partition[cluster] = micronode` with micronode
/// ids in `0..count`.
///
/// Fails with an integrity violation when any micronode would be empty.
pub fn build_micronodes_from_partition(
    level: &mut LevelMesh,
    partition: &[Index],
    count: usize,
) -> Result<usize> {
    if partition.len() != level.cluster_count() {
        return Err(Error::IntegrityViolation(format!(
            "{} micronode assignments for {} clusters",
            partition.len(),
            level.cluster_count()
        )));
    }
    let mut members: Vec<Vec<Index>> = vec![Vec::new(); count];
    for (cluster, &node) in partition.iter().enumerate() {
        match members.get_mut(node as usize) {
            Some(list) => list.push(cluster as Index),
            None => {
                return Err(Error::IntegrityViolation(format!(
                    "cluster {} assigned to micronode {} of {}",
                    cluster, node, count
                )))
            }
        }
    }
    if let Some(empty) = members.iter().position(|m| m.is_empty()) {
        return Err(Error::IntegrityViolation(format!(
            "micronode {} of level {} has no clusters",
            empty, level.level
        )));
    }

    let mut nodes: Vec<MicroNode> = members.into_iter().map(MicroNode::new).collect();
    for node in &mut nodes {
        update_micronode_bounds(level, node);
    }
    level.micronodes = nodes;
    Ok(count)
}

/// Merges the smallest group into its best-connected neighbor (or the
/// nearest group when it has none) until `target` groups remain.
fn merge_smallest_groups(
    graph: &WeightedGraph,
    centers: &[Point3f],
    assignment: &mut [Index],
    mut count: usize,
    target: usize,
) -> usize {
    let n = assignment.len();
    while count > target.max(1) {
        let sizes = part_sizes(assignment, count);
        let Some(smallest) = (0..count).min_by_key(|&g| (sizes[g], g)) else {
            break;
        };

        let mut shared = vec![0i64; count];
        for v in (0..n).filter(|&v| assignment[v] as usize == smallest) {
            for (o, w) in graph.neighbors(v) {
                let g = assignment[o as usize] as usize;
                if g != smallest {
                    shared[g] += w as i64;
                }
            }
        }
        let connected = (0..count)
            .filter(|&g| g != smallest && shared[g] > 0)
            .max_by(|&a, &b| shared[a].cmp(&shared[b]).then(b.cmp(&a)));

        let into = connected.unwrap_or_else(|| {
            let mut sums = vec![Vector3f::zeros(); count];
            for v in 0..n {
                sums[assignment[v] as usize] += centers[v].coords;
            }
            let mean = |g: usize| sums[g] / sizes[g].max(1) as f32;
            let origin = mean(smallest);
            (0..count)
                .filter(|&g| g != smallest)
                .min_by(|&a, &b| {
                    (mean(a) - origin)
                        .norm()
                        .total_cmp(&(mean(b) - origin).norm())
                        .then(a.cmp(&b))
                })
                .unwrap_or(smallest)
        });
        if into == smallest {
            break;
        }

        for a in assignment.iter_mut() {
            let g = *a as usize;
            if g == smallest {
                *a = into as Index;
            }
            if *a as usize > smallest {
                *a -= 1;
            }
        }
        count -= 1;
    }
    count
}

/// Groups the clusters of `level` into micronodes of about
/// `clusters_per_node` clusters each.
///
/// `cap` bounds the number of micronodes from above. A target of one
/// produces the root micronode directly. Returns the micronode count.
pub fn build_micronodes(
    level: &mut LevelMesh,
    clusters_per_node: usize,
    strategy: ClusteringStrategy,
    cap: Option<usize>,
) -> Result<usize> {
    let clusters = level.cluster_count();
    if clusters == 0 {
        return Err(Error::IntegrityViolation(format!(
            "level {} has no clusters to group",
            level.level
        )));
    }
    let target = micronode_target(clusters, clusters_per_node, cap).min(clusters);
    if target == 1 {
        return build_micronodes_from_partition(level, &vec![0; clusters], 1);
    }

    let graph = cluster_graph(level);
    let (partition, count) = match strategy {
        ClusteringStrategy::Greedy => {
            let centers = cluster_centers(level);
            let (mut assignment, count) = grow_regions(&graph, &centers, clusters_per_node);
            let count = merge_smallest_groups(&graph, &centers, &mut assignment, count, target);
            (assignment, count)
        }
        ClusteringStrategy::GraphPartition => {
            let mut partition = partition_kway(&graph, target)?;
            let count = densify_parts(&mut partition, target);
            (partition, count)
        }
    };

    let count = build_micronodes_from_partition(level, &partition, count)?;
    debug!(
        level = level.level,
        clusters,
        micronodes = count,
        target,
        "clusters grouped into micronodes"
    );
    Ok(count)
}
