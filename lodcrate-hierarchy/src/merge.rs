//! Merging a micronode's clusters into a standalone submesh

use lodcrate_core::{Index, LevelMesh, MicroNode, SubMesh, Triangle, Wedge, NONE};
use std::collections::HashMap;

/// Owner entry of a position referenced by more than one micronode
pub const SHARED: Index = NONE - 1;

/// Micronode of every cluster, `NONE` for clusters no micronode lists
pub fn micronode_of_clusters(level: &LevelMesh) -> Vec<Index> {
    let mut owner = vec![NONE; level.cluster_count()];
    for (m, node) in level.micronodes.iter().enumerate() {
        for &c in &node.cluster_ids {
            if let Some(slot) = owner.get_mut(c as usize) {
                *slot = m as Index;
            }
        }
    }
    owner
}

/// For every position, the only micronode whose triangles reference it,
/// [`SHARED`] when several do and `NONE` when none does.
pub fn position_owners(level: &LevelMesh) -> Vec<Index> {
    let node_of_cluster = micronode_of_clusters(level);
    let mut owners = vec![NONE; level.position_count()];
    for (t, &cluster) in level.triangle_to_cluster.iter().enumerate() {
        let node = node_of_cluster[cluster as usize];
        for p in level.triangle_positions(t) {
            let slot = &mut owners[p as usize];
            if *slot == NONE {
                *slot = node;
            } else if *slot != node {
                *slot = SHARED;
            }
        }
    }
    owners
}

/// A micronode cut out of its level
#[derive(Debug, Clone)]
pub struct ExtractedMicronode {
    pub submesh: SubMesh,
    /// Positions some triangle outside the micronode also references
    pub locked: Vec<bool>,
    /// Level position index of every submesh position
    pub global_positions: Vec<Index>,
}

impl ExtractedMicronode {
    pub fn locked_count(&self) -> usize {
        self.locked.iter().filter(|&&l| l).count()
    }
}

/// Copies the triangles of `node`'s clusters, in cluster order, into a
/// submesh with local wedge and position indices.
///
/// A position is locked unless `owners` names `node_id` as its only user,
/// so vertices on seams with sibling micronodes stay where they are.
/// Normal and texcoord indices keep pointing into the level's arrays.
pub fn extract_micronode(
    level: &LevelMesh,
    node: &MicroNode,
    node_id: usize,
    owners: &[Index],
) -> ExtractedMicronode {
    let mut submesh = SubMesh::default();
    let mut global_positions = Vec::new();
    let mut local_position: HashMap<Index, Index> = HashMap::new();
    let mut local_wedge: HashMap<Index, Index> = HashMap::new();
    let wedges = level.wedges.as_slice();
    let positions = level.positions.as_slice();

    for &c in &node.cluster_ids {
        let cluster = level.clusters[c as usize];
        for t in cluster.triangle_range() {
            let mut local = [0 as Index; 3];
            for (corner, &w) in level.triangles[t].w.iter().enumerate() {
                local[corner] = *local_wedge.entry(w).or_insert_with(|| {
                    let wedge = wedges[w as usize];
                    let p = *local_position.entry(wedge.p).or_insert_with(|| {
                        submesh.positions.push(positions[wedge.p as usize]);
                        global_positions.push(wedge.p);
                        (submesh.positions.len() - 1) as Index
                    });
                    submesh.wedges.push(Wedge::new(p, wedge.n, wedge.t));
                    (submesh.wedges.len() - 1) as Index
                });
            }
            submesh.triangles.push(Triangle { w: local });
            if level.attributes.has_materials {
                submesh.material_ids.push(level.material_ids[t]);
            }
        }
    }

    let locked = global_positions
        .iter()
        .map(|&p| owners[p as usize] != node_id as Index)
        .collect();
    ExtractedMicronode {
        submesh,
        locked,
        global_positions,
    }
}
