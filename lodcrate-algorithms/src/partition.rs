//! Weighted graphs and k-way partitioning through METIS

use lodcrate_core::{Error, Index, Result};
use metis::Graph;
use tracing::warn;

/// Seed handed to METIS so partitions are reproducible
pub const METIS_SEED: i32 = 17;

/// Symmetric graph in compressed sparse row form, as METIS expects it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightedGraph {
    xadj: Vec<i32>,
    adjncy: Vec<i32>,
    adjwgt: Vec<i32>,
}

impl WeightedGraph {
    pub fn vertex_count(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.adjncy.len() / 2
    }

    /// Neighbors of `v` with edge weights, in ascending neighbor order
    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = (Index, i32)> + '_ {
        let range = self.xadj[v] as usize..self.xadj[v + 1] as usize;
        self.adjncy[range.clone()]
            .iter()
            .zip(&self.adjwgt[range])
            .map(|(&n, &w)| (n as Index, w))
    }

    pub fn degree(&self, v: usize) -> usize {
        (self.xadj[v + 1] - self.xadj[v]) as usize
    }
}

/// Collects undirected edges and produces a [`WeightedGraph`].
///
/// Self loops are ignored, duplicate edges are merged by summing their
/// weights and every stored weight is at least 1.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    vertex_count: usize,
    edges: Vec<(Index, Index, i32)>,
}

impl GraphBuilder {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertex_count,
            edges: Vec::new(),
        }
    }

    pub fn add_edge(&mut self, a: Index, b: Index, weight: i32) {
        if a == b {
            return;
        }
        self.edges.push((a, b, weight));
        self.edges.push((b, a, weight));
    }

    pub fn build(mut self) -> WeightedGraph {
        self.edges.sort_unstable_by_key(|&(a, b, _)| (a, b));

        let mut xadj = Vec::with_capacity(self.vertex_count + 1);
        let mut adjncy = Vec::with_capacity(self.edges.len());
        let mut adjwgt: Vec<i32> = Vec::with_capacity(self.edges.len());
        let mut edges = self.edges.into_iter().peekable();
        for v in 0..self.vertex_count as Index {
            xadj.push(adjncy.len() as i32);
            let mut last = None;
            while let Some(&(a, b, w)) = edges.peek() {
                if a != v {
                    break;
                }
                edges.next();
                if last == Some(b) {
                    if let Some(weight) = adjwgt.last_mut() {
                        *weight = weight.saturating_add(w.max(1));
                    }
                } else {
                    adjncy.push(b as i32);
                    adjwgt.push(w.max(1));
                    last = Some(b);
                }
            }
        }
        xadj.push(adjncy.len() as i32);

        WeightedGraph {
            xadj,
            adjncy,
            adjwgt,
        }
    }
}

/// Splits the vertices of `graph` into at most `parts` parts minimizing
/// the weighted edge cut.
///
/// One part or a single vertex yields all zeros, and at least as many parts
/// as vertices gives every vertex its own part. An edgeless graph cannot be
/// partitioned and is reported as a failure.
pub fn partition_kway(graph: &WeightedGraph, parts: usize) -> Result<Vec<Index>> {
    let n = graph.vertex_count();
    if parts <= 1 || n <= 1 {
        return Ok(vec![0; n]);
    }
    if parts >= n {
        return Ok((0..n as Index).collect());
    }
    if graph.adjncy.is_empty() {
        return Err(Error::GraphPartition(format!(
            "cannot split {} disconnected vertices into {} parts",
            n, parts
        )));
    }

    let mut part = vec![0i32; n];
    Graph::new(1, parts as i32, &graph.xadj, &graph.adjncy)
        .map_err(|e| Error::GraphPartition(format!("invalid graph: {:?}", e)))?
        .set_option(metis::option::Seed(METIS_SEED))
        .set_adjwgt(&graph.adjwgt)
        .part_kway(&mut part)
        .map_err(|e| Error::GraphPartition(format!("METIS k-way partitioning failed: {:?}", e)))?;

    part.into_iter()
        .map(|p| {
            if p < 0 || p as usize >= parts {
                Err(Error::GraphPartition(format!(
                    "METIS returned part {} outside 0..{}",
                    p, parts
                )))
            } else {
                Ok(p as Index)
            }
        })
        .collect()
}

/// Renumbers part ids densely in ascending order, dropping parts nobody
/// uses. Returns the number of remaining parts.
pub fn densify_parts(assignment: &mut [Index], parts: usize) -> usize {
    let mut used = vec![false; parts];
    for &p in assignment.iter() {
        used[p as usize] = true;
    }
    let remap = lodcrate_core::Remap::from_kept(&used);
    let remaining = remap.target_len();
    if remaining < parts {
        warn!(
            requested = parts,
            produced = remaining,
            "partitioner left parts empty, renumbering"
        );
        remap.apply_in_place(assignment);
    }
    remaining
}
