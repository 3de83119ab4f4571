//! Re-splitting a simplified submesh into next-level clusters

use lodcrate_algorithms::{compute_adjacency, densify_parts, partition_kway, GraphBuilder};
use lodcrate_core::{Index, Point3f, Result, SubMesh, NONE};

/// Edge weight bounds for the boundary-length graph
pub const MIN_EDGE_WEIGHT: f32 = 1.0;
pub const MAX_EDGE_WEIGHT: f32 = 1.0e6;

/// Weight of the graph edge between two triangles sharing an edge of length
/// `edge_length` whose centroids are `centroid_distance` apart. Long shared
/// edges between close triangles are expensive to cut.
pub fn boundary_weight(edge_length: f32, centroid_distance: f32) -> i32 {
    let w = 100.0 * edge_length / centroid_distance.max(1e-6);
    if !w.is_finite() {
        return MIN_EDGE_WEIGHT as i32;
    }
    w.clamp(MIN_EDGE_WEIGHT, MAX_EDGE_WEIGHT).round() as i32
}

/// Triangles of a submesh grouped into clusters, in output order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resplit {
    /// Cluster of every submesh triangle
    pub assignment: Vec<Index>,
    pub cluster_count: usize,
}

impl Resplit {
    /// Triangle indices of each cluster, keeping submesh order inside a cluster
    pub fn cluster_triangles(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.cluster_count];
        for (t, &c) in self.assignment.iter().enumerate() {
            members[c as usize].push(t);
        }
        members
    }
}

/// Partitions `mesh` into `ceil(triangles / faces_per_cluster)` clusters
/// with a graph partition over its own adjacency.
pub fn resplit_submesh(mesh: &SubMesh, faces_per_cluster: usize) -> Result<Resplit> {
    let n = mesh.triangle_count();
    let parts = n.div_ceil(faces_per_cluster.max(1)).max(1);
    if parts == 1 {
        return Ok(Resplit {
            assignment: vec![0; n],
            cluster_count: usize::from(n > 0),
        });
    }

    let (adjacency, _) = compute_adjacency(&mesh.wedges, &mesh.triangles);
    let centroids: Vec<Point3f> = (0..n).map(|t| mesh.triangle_centroid(t)).collect();

    let mut builder = GraphBuilder::new(n);
    for (t, adj) in adjacency.iter().enumerate() {
        let p = mesh.triangle_positions(t);
        for (corner, &other) in adj.opp.iter().enumerate() {
            let o = other as usize;
            if other == NONE || o <= t {
                continue;
            }
            let a = mesh.positions[p[corner] as usize];
            let b = mesh.positions[p[(corner + 1) % 3] as usize];
            let weight = boundary_weight((b - a).norm(), (centroids[t] - centroids[o]).norm());
            builder.add_edge(t as Index, other, weight);
        }
    }

    let mut assignment = partition_kway(&builder.build(), parts)?;
    let cluster_count = densify_parts(&mut assignment, parts.min(n));
    Ok(Resplit {
        assignment,
        cluster_count,
    })
}
