//! Triangle-triangle adjacency from sorted half-edges

use lodcrate_core::{FaceAdjacency, Index, LevelMesh, Result, Triangle, Wedge, NONE};
use rayon::prelude::*;
use tracing::{debug, warn};

/// Directed edge `v0 -> v1` of corner `corner` in `face`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HalfEdge {
    v0: Index,
    v1: Index,
    face: Index,
    corner: u8,
}

impl HalfEdge {
    fn sort_key(&self) -> (Index, Index, Index, Index, u8) {
        (
            self.v0.min(self.v1),
            self.v0.max(self.v1),
            self.v0,
            self.face,
            self.corner,
        )
    }

    fn same_edge(&self, other: &HalfEdge) -> bool {
        self.v0.min(self.v1) == other.v0.min(other.v1)
            && self.v0.max(self.v1) == other.v0.max(other.v1)
    }
}

/// Edge counts gathered while linking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjacencyStats {
    pub linked_edges: usize,
    pub border_edges: usize,
    /// Edges shared by more than two triangles or by two triangles with the
    /// same orientation; both are left as borders.
    pub non_manifold_edges: usize,
}

/// Computes one [`FaceAdjacency`] per triangle.
///
/// Edges shared by exactly two oppositely oriented triangles are linked in
/// both directions. Everything else, including non-manifold edges, stays
/// `NONE`.
pub fn compute_adjacency(
    wedges: &[Wedge],
    triangles: &[Triangle],
) -> (Vec<FaceAdjacency>, AdjacencyStats) {
    let mut adjacency = vec![FaceAdjacency::BORDER; triangles.len()];
    let mut stats = AdjacencyStats::default();
    if triangles.is_empty() {
        return (adjacency, stats);
    }

    let mut half_edges: Vec<HalfEdge> = Vec::with_capacity(triangles.len() * 3);
    for (face, triangle) in triangles.iter().enumerate() {
        let p = triangle.w.map(|w| wedges[w as usize].p);
        for corner in 0..3 {
            let v0 = p[corner];
            let v1 = p[(corner + 1) % 3];
            if v0 == v1 {
                continue;
            }
            half_edges.push(HalfEdge {
                v0,
                v1,
                face: face as Index,
                corner: corner as u8,
            });
        }
    }
    half_edges.par_sort_unstable_by_key(HalfEdge::sort_key);

    let mut start = 0;
    while start < half_edges.len() {
        let mut end = start + 1;
        while end < half_edges.len() && half_edges[start].same_edge(&half_edges[end]) {
            end += 1;
        }

        match end - start {
            1 => stats.border_edges += 1,
            2 => {
                let a = half_edges[start];
                let b = half_edges[start + 1];
                if a.v0 == b.v1 && a.v1 == b.v0 && a.face != b.face {
                    adjacency[a.face as usize].opp[a.corner as usize] = b.face;
                    adjacency[b.face as usize].opp[b.corner as usize] = a.face;
                    stats.linked_edges += 1;
                } else {
                    stats.non_manifold_edges += 1;
                }
            }
            _ => stats.non_manifold_edges += 1,
        }
        start = end;
    }

    if stats.non_manifold_edges > 0 {
        warn!(
            count = stats.non_manifold_edges,
            "non-manifold or inconsistently oriented edges treated as borders"
        );
    }
    (adjacency, stats)
}

/// Recomputes `level.adjacency` from its triangles and wedges.
pub fn build_adjacency(level: &mut LevelMesh) -> Result<AdjacencyStats> {
    let (adjacency, stats) = compute_adjacency(&level.wedges, &level.triangles);
    level.adjacency.assign(&adjacency)?;
    debug!(
        level = level.level,
        linked = stats.linked_edges,
        border = stats.border_edges,
        non_manifold = stats.non_manifold_edges,
        "adjacency computed"
    );
    Ok(stats)
}

/// Number of corners without a neighbor
pub fn count_border_corners(adjacency: &[FaceAdjacency]) -> usize {
    adjacency
        .iter()
        .map(|a| a.opp.iter().filter(|&&o| o == NONE).count())
        .sum()
}
