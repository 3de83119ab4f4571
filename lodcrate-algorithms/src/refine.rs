//! Fiduccia-Mattheyses style boundary refinement of a partition

use crate::partition::WeightedGraph;
use lodcrate_core::{Index, Point3f, Vector3f};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weights and budgets of the refinement passes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementParams {
    pub max_passes: usize,
    pub batch_size: usize,
    /// Moves applied per batch at most
    pub top_k: usize,
    pub w_topology: f32,
    pub w_size: f32,
    pub w_distance: f32,
}

impl Default for RefinementParams {
    fn default() -> Self {
        Self {
            max_passes: 4,
            batch_size: 512,
            top_k: 64,
            w_topology: 1.0,
            w_size: 0.01,
            w_distance: 0.05,
        }
    }
}

impl RefinementParams {
    /// No passes at all
    pub fn disabled() -> Self {
        Self {
            max_passes: 0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefinementReport {
    pub passes: usize,
    pub moves: usize,
    pub gain: f64,
}

#[derive(Debug, Clone, Copy)]
struct Move {
    item: Index,
    from: Index,
    to: Index,
    score: f32,
}

struct PartitionState {
    sizes: Vec<usize>,
    sums: Vec<Vector3f>,
}

impl PartitionState {
    fn new(centroids: &[Point3f], assignment: &[Index], parts: usize) -> Self {
        let mut sizes = vec![0usize; parts];
        let mut sums = vec![Vector3f::zeros(); parts];
        for (item, &part) in assignment.iter().enumerate() {
            sizes[part as usize] += 1;
            sums[part as usize] += centroids[item].coords;
        }
        Self { sizes, sums }
    }

    fn centers(&self) -> Vec<Point3f> {
        self.sums
            .iter()
            .zip(&self.sizes)
            .map(|(sum, &size)| Point3f::from(sum / size.max(1) as f32))
            .collect()
    }

    fn apply(&mut self, m: &Move, centroid: &Point3f) {
        self.sizes[m.from as usize] -= 1;
        self.sizes[m.to as usize] += 1;
        self.sums[m.from as usize] -= centroid.coords;
        self.sums[m.to as usize] += centroid.coords;
    }
}

/// Best positive-score move of `item` into a neighboring part
fn best_move(
    item: usize,
    graph: &WeightedGraph,
    centroids: &[Point3f],
    assignment: &[Index],
    sizes: &[usize],
    centers: &[Point3f],
    size_cap: usize,
    params: &RefinementParams,
) -> Option<Move> {
    let from = assignment[item];
    if sizes[from as usize] <= 1 {
        return None;
    }

    let mut shared_from = 0i64;
    let mut neighbor_parts: Vec<(Index, i64)> = Vec::new();
    for (other, weight) in graph.neighbors(item) {
        let part = assignment[other as usize];
        if part == from {
            shared_from += weight as i64;
        } else {
            match neighbor_parts.iter_mut().find(|(p, _)| *p == part) {
                Some((_, shared)) => *shared += weight as i64,
                None => neighbor_parts.push((part, weight as i64)),
            }
        }
    }
    neighbor_parts.sort_unstable_by_key(|&(p, _)| p);

    let size_from = sizes[from as usize] as f32;
    let distance_from = (centroids[item] - centers[from as usize]).norm();
    let mut best: Option<Move> = None;
    for (to, shared_to) in neighbor_parts {
        if sizes[to as usize] + 1 > size_cap {
            continue;
        }
        let topology = (shared_to - shared_from) as f32;
        // Change in the summed squared deviation of both sizes from the target
        let size = 2.0 * (size_from - sizes[to as usize] as f32) - 2.0;
        let distance = (centroids[item] - centers[to as usize]).norm() - distance_from;
        let score =
            params.w_topology * topology + params.w_size * size - params.w_distance * distance;
        if score > 0.0 && best.map_or(true, |b| score > b.score) {
            best = Some(Move {
                item: item as Index,
                from,
                to,
                score,
            });
        }
    }
    best
}

/// Moves boundary items between parts while the combined score improves.
///
/// `graph` carries topology weights between items, `assignment` maps items to
/// parts `0..parts`. No move empties a part or grows one beyond `size_cap`.
pub fn refine_partition(
    graph: &WeightedGraph,
    centroids: &[Point3f],
    assignment: &mut [Index],
    parts: usize,
    size_cap: usize,
    params: &RefinementParams,
) -> RefinementReport {
    let mut report = RefinementReport::default();
    let n = assignment.len();
    if n == 0 || parts < 2 || params.batch_size == 0 || params.top_k == 0 {
        return report;
    }

    let mut state = PartitionState::new(centroids, assignment, parts);
    // Batch stamp per item; equal to the current batch when locked
    let mut locked = vec![usize::MAX; n];
    let mut batch_id = 0usize;

    for _ in 0..params.max_passes {
        report.passes += 1;
        let mut pass_gain = 0.0f64;

        for start in (0..n).step_by(params.batch_size) {
            let end = (start + params.batch_size).min(n);
            let centers = state.centers();
            let sizes = &state.sizes;
            let current: &[Index] = assignment;

            let mut moves: Vec<Move> = (start..end)
                .into_par_iter()
                .filter_map(|item| {
                    best_move(item, graph, centroids, current, sizes, &centers, size_cap, params)
                })
                .collect();
            moves.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.item.cmp(&b.item)));
            moves.truncate(params.top_k);

            for m in moves {
                let item = m.item as usize;
                if locked[item] == batch_id
                    || state.sizes[m.from as usize] <= 1
                    || state.sizes[m.to as usize] + 1 > size_cap
                {
                    continue;
                }
                assignment[item] = m.to;
                state.apply(&m, &centroids[item]);
                locked[item] = batch_id;
                for (other, _) in graph.neighbors(item) {
                    locked[other as usize] = batch_id;
                }
                pass_gain += m.score as f64;
                report.moves += 1;
            }
            batch_id += 1;
        }

        report.gain += pass_gain;
        debug!(pass = report.passes, gain = pass_gain, moves = report.moves, "refinement pass");
        if pass_gain <= 0.0 {
            break;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::GraphBuilder;

    /// Items on a line, each linked to its successor
    fn line(n: usize) -> (WeightedGraph, Vec<Point3f>) {
        let mut builder = GraphBuilder::new(n);
        for i in 1..n as Index {
            builder.add_edge(i - 1, i, 1);
        }
        let centroids = (0..n).map(|i| Point3f::new(i as f32, 0.0, 0.0)).collect();
        (builder.build(), centroids)
    }

    #[test]
    fn test_default_params() {
        let params = RefinementParams::default();
        assert_eq!(params.max_passes, 4);
        assert_eq!(params.batch_size, 512);
        assert_eq!(params.top_k, 64);
    }

    #[test]
    fn test_stray_item_moves_home() {
        // Item 2 sits between parts but is assigned to the far part on its own edge
        let mut builder = GraphBuilder::new(6);
        for (a, b) in [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)] {
            builder.add_edge(a, b, 1);
        }
        let graph = builder.build();
        let centroids: Vec<Point3f> = [0.0, 1.0, 2.0, 10.0, 11.0, 12.0]
            .iter()
            .map(|&x| Point3f::new(x, 0.0, 0.0))
            .collect();
        let mut assignment = vec![0, 0, 1, 1, 1, 1];
        let report = refine_partition(
            &graph,
            &centroids,
            &mut assignment,
            2,
            10,
            &RefinementParams::default(),
        );
        assert_eq!(assignment, vec![0, 0, 0, 1, 1, 1]);
        assert!(report.moves >= 1);
        assert!(report.gain > 0.0);
    }

    #[test]
    fn test_never_empties_a_part() {
        let (graph, centroids) = line(3);
        // Part 1 holds a single item surrounded by part 0
        let mut assignment = vec![0, 1, 0];
        refine_partition(&graph, &centroids, &mut assignment, 2, 10, &RefinementParams::default());
        assert!(assignment.contains(&1));
    }

    #[test]
    fn test_respects_size_cap() {
        let (graph, centroids) = line(8);
        let mut assignment = vec![0, 0, 0, 1, 0, 1, 1, 1];
        refine_partition(&graph, &centroids, &mut assignment, 2, 4, &RefinementParams::default());
        for part in 0..2 {
            assert!(assignment.iter().filter(|&&p| p == part).count() <= 4);
        }
    }

    #[test]
    fn test_disabled_is_noop() {
        let (graph, centroids) = line(4);
        let mut assignment = vec![0, 1, 0, 1];
        let report = refine_partition(
            &graph,
            &centroids,
            &mut assignment,
            2,
            4,
            &RefinementParams::disabled(),
        );
        assert_eq!(report.moves, 0);
        assert_eq!(assignment, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_deterministic() {
        let (graph, centroids) = line(100);
        let initial: Vec<Index> = (0..100).map(|i| ((i * 7) % 5) as Index).collect();
        let params = RefinementParams {
            batch_size: 8,
            ..Default::default()
        };
        let mut a = initial.clone();
        let mut b = initial;
        refine_partition(&graph, &centroids, &mut a, 5, 100, &params);
        refine_partition(&graph, &centroids, &mut b, 5, 100, &params);
        assert_eq!(a, b);
    }
}
