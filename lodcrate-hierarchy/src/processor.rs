//! Deriving the next level from the current one
//!
//! Every micronode of the current level is merged, simplified and re-split
//! independently on the worker pool. Workers only read the current level and
//! return a [`MicronodeDelta`]; a single sequential pass then appends the
//! deltas in micronode order, so the next level does not depend on how many
//! threads ran or in which order they finished.

use crate::config::BuildConfig;
use crate::merge::{extract_micronode, position_owners, ExtractedMicronode};
use crate::parallel::WorkerPool;
use crate::resplit::resplit_submesh;
use lodcrate_algorithms::{build_adjacency, build_micronodes, compact_level, recompute_normals};
use lodcrate_core::{
    ritter_sphere, BoundingSphere, Cluster, Error, ErrorKind, Index, LevelMesh, Point3f, Result,
    Simplifier, SubMesh, Triangle, Wedge,
};
use std::time::Instant;
use tracing::{debug, info, info_span, trace};

/// Everything one micronode contributes to the next level
#[derive(Debug, Clone, PartialEq)]
pub struct MicronodeDelta {
    pub micronode: usize,
    /// Error reported by the simplifier
    pub error: f32,
    /// New coordinates of the positions only this micronode references
    pub owned_positions: Vec<(Index, Point3f)>,
    /// Wedges with level position indices
    pub wedges: Vec<Wedge>,
    /// Triangles indexing into `wedges`, grouped by cluster
    pub triangles: Vec<Triangle>,
    pub material_ids: Vec<Index>,
    /// Triangle count and bounding sphere of each new cluster, in order
    pub clusters: Vec<(Index, BoundingSphere)>,
}

impl MicronodeDelta {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// Checks what the simplifier handed back against what it was given.
pub fn check_simplified(
    before: &[Point3f],
    locked: &[bool],
    mesh: &SubMesh,
    with_materials: bool,
) -> Result<()> {
    if mesh.positions.len() != before.len() {
        return Err(Error::Collaborator(format!(
            "simplifier changed the position count from {} to {}",
            before.len(),
            mesh.positions.len()
        )));
    }
    for (i, (old, new)) in before.iter().zip(&mesh.positions).enumerate() {
        let moved = old
            .coords
            .iter()
            .zip(new.coords.iter())
            .any(|(a, b)| a.to_bits() != b.to_bits());
        if locked[i] && moved {
            return Err(Error::Collaborator(format!(
                "simplifier moved locked position {} from {:?} to {:?}",
                i, old, new
            )));
        }
    }
    mesh.validate()?;
    if mesh.is_empty() {
        return Err(Error::Collaborator(
            "simplifier removed every triangle".to_string(),
        ));
    }
    let expected = if with_materials { mesh.triangle_count() } else { 0 };
    if mesh.material_ids.len() != expected {
        return Err(Error::Collaborator(format!(
            "simplifier returned {} material ids for {} triangles",
            mesh.material_ids.len(),
            mesh.triangle_count()
        )));
    }
    Ok(())
}

/// Runs one level of merge, simplify and re-split
pub struct LevelProcessor<'a> {
    config: &'a BuildConfig,
    simplifier: &'a dyn Simplifier,
    pool: &'a WorkerPool,
}

impl<'a> LevelProcessor<'a> {
    pub fn new(config: &'a BuildConfig, simplifier: &'a dyn Simplifier, pool: &'a WorkerPool) -> Self {
        Self {
            config,
            simplifier,
            pool,
        }
    }

    /// Merges, simplifies and re-splits micronode `m` of `level`.
    pub fn process_micronode(
        &self,
        level: &LevelMesh,
        owners: &[Index],
        m: usize,
    ) -> Result<MicronodeDelta> {
        let ExtractedMicronode {
            mut submesh,
            locked,
            global_positions,
        } = extract_micronode(level, &level.micronodes[m], m, owners);

        let before = submesh.positions.clone();
        let input_triangles = submesh.triangle_count();
        let target = (input_triangles / 2).max(1);
        let error = self
            .simplifier
            .simplify(&mut submesh, target, &locked)
            .map_err(|e| match e.kind() {
                ErrorKind::CollaboratorFailure => e,
                _ => Error::Collaborator(format!("simplifier failed: {}", e)),
            })?;
        if !error.is_finite() || error < 0.0 {
            return Err(Error::Collaborator(format!(
                "simplifier reported error {}",
                error
            )));
        }
        check_simplified(&before, &locked, &submesh, level.attributes.has_materials)?;

        let resplit = resplit_submesh(&submesh, self.config.faces_per_cluster)?;
        let mut triangles = Vec::with_capacity(submesh.triangle_count());
        let mut material_ids = Vec::with_capacity(submesh.material_ids.len());
        let mut clusters = Vec::with_capacity(resplit.cluster_count);
        for members in resplit.cluster_triangles() {
            let mut corners = Vec::with_capacity(members.len() * 3);
            for &t in &members {
                triangles.push(submesh.triangles[t]);
                if let Some(&id) = submesh.material_ids.get(t) {
                    material_ids.push(id);
                }
                for p in submesh.triangle_positions(t) {
                    corners.push(submesh.positions[p as usize]);
                }
            }
            clusters.push((members.len() as Index, ritter_sphere(&corners)));
        }

        let wedges = submesh
            .wedges
            .iter()
            .map(|w| Wedge::new(global_positions[w.p as usize], w.n, w.t))
            .collect();
        let owned_positions = global_positions
            .iter()
            .zip(&locked)
            .enumerate()
            .filter(|(_, (_, &is_locked))| !is_locked)
            .map(|(local, (&global, _))| (global, submesh.positions[local]))
            .collect();

        trace!(
            micronode = m,
            input_triangles,
            output_triangles = triangles.len(),
            clusters = clusters.len(),
            error,
            "micronode simplified"
        );
        Ok(MicronodeDelta {
            micronode: m,
            error,
            owned_positions,
            wedges,
            triangles,
            material_ids,
            clusters,
        })
    }

    /// Builds level `current.level + 1`.
    ///
    /// Records each micronode's error and children in `current`; its
    /// geometry is left untouched. The returned level is compacted, has
    /// fresh adjacency and fewer micronodes than `current`.
    pub fn process_level(&self, current: &mut LevelMesh) -> Result<LevelMesh> {
        let next_index = current.level + 1;
        let span = info_span!("process_level", level = current.level);
        let _guard = span.enter();
        let started = Instant::now();

        let owners = position_owners(current);
        let level: &LevelMesh = current;
        let deltas = self.pool.fan_out(level.micronode_count(), |m| {
            self.process_micronode(level, &owners, m)
                .map_err(|e| e.in_micronode(level.level, m))
        })?;

        let mut next = assemble_next_level(current, &deltas, &self.config.storage)
            .map_err(|e| e.in_level(next_index))?;
        self.finish_level(&mut next, current.micronode_count())
            .map_err(|e| e.in_level(next_index))?;

        info!(
            level = next.level,
            triangles = next.triangle_count(),
            positions = next.position_count(),
            clusters = next.cluster_count(),
            micronodes = next.micronode_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "level built"
        );
        Ok(next)
    }

    /// Compaction, normals, adjacency and micronodes of a freshly assembled level
    fn finish_level(&self, next: &mut LevelMesh, previous_micronodes: usize) -> Result<()> {
        let report = compact_level(next)?;
        debug!(
            level = next.level,
            dropped_positions = report.dropped_positions,
            dropped_wedges = report.dropped_wedges,
            "level compacted"
        );
        if !next.attributes.has_normals {
            recompute_normals(next)?;
        }
        next.update_bounds();
        build_adjacency(next)?;
        build_micronodes(
            next,
            self.config.clusters_per_node,
            self.config.strategy,
            Some(previous_micronodes.saturating_sub(1)),
        )?;
        next.validate()
    }
}

/// Appends `deltas` in micronode order to a copy of `current`'s positions
/// and texcoords, creating the next level's clusters.
///
/// Fills `error` and `children_nodes` of `current`'s micronodes.
pub fn assemble_next_level(
    current: &mut LevelMesh,
    deltas: &[MicronodeDelta],
    storage: &lodcrate_core::LevelStorage,
) -> Result<LevelMesh> {
    let mut next = LevelMesh::create(storage, current.level + 1)?;
    next.attributes = current.attributes;
    next.positions.assign(&current.positions)?;
    next.normals.assign(&current.normals)?;
    next.texcoords.assign(&current.texcoords)?;

    let mut clusters = Vec::new();
    let mut triangle_to_cluster = Vec::new();
    for delta in deltas {
        let node = current.micronodes.get_mut(delta.micronode).ok_or_else(|| {
            Error::IntegrityViolation(format!(
                "delta for micronode {} of {}",
                delta.micronode,
                deltas.len()
            ))
        })?;

        let positions = next.positions.as_mut_slice();
        for &(p, position) in &delta.owned_positions {
            positions[p as usize] = position;
        }

        let wedge_base = next.wedges.len() as Index;
        next.wedges.extend_from_slice(&delta.wedges)?;
        for triangle in &delta.triangles {
            next.triangles.push(Triangle {
                w: triangle.w.map(|w| w + wedge_base),
            })?;
        }
        next.material_ids.extend_from_slice(&delta.material_ids)?;

        node.error = delta.error;
        node.children_nodes.clear();
        let mut offset = triangle_to_cluster.len() as Index;
        for &(count, sphere) in &delta.clusters {
            let id = clusters.len() as Index;
            if count == 0 {
                return Err(Error::IntegrityViolation(format!(
                    "micronode {} produced an empty cluster",
                    delta.micronode
                )));
            }
            clusters.push(Cluster {
                triangle_offset: offset,
                triangle_count: count,
                sphere,
                source_node: delta.micronode as Index,
            });
            triangle_to_cluster.extend(std::iter::repeat(id).take(count as usize));
            node.children_nodes.push(id);
            offset += count;
        }
    }

    if triangle_to_cluster.len() != next.triangle_count() {
        return Err(Error::IntegrityViolation(format!(
            "clusters cover {} of {} triangles",
            triangle_to_cluster.len(),
            next.triangle_count()
        )));
    }
    next.clusters.assign(&clusters)?;
    next.triangle_to_cluster.assign(&triangle_to_cluster)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::ThreadPoolConfig;
    use crate::test_support::{clustered_grid, grid_submesh};
    use lodcrate_simplification::EdgeCollapseSimplifier;

    /// Returns the mesh unchanged
    struct Identity;

    impl Simplifier for Identity {
        fn simplify(&self, _mesh: &mut SubMesh, _target: usize, _locked: &[bool]) -> Result<f32> {
            Ok(0.0)
        }
    }

    /// Moves every position, locked or not
    struct Jitter;

    impl Simplifier for Jitter {
        fn simplify(&self, mesh: &mut SubMesh, _target: usize, _locked: &[bool]) -> Result<f32> {
            for p in mesh.positions.iter_mut() {
                p.z += 0.5;
            }
            Ok(0.5)
        }
    }

    /// Drops every triangle
    struct Eraser;

    impl Simplifier for Eraser {
        fn simplify(&self, mesh: &mut SubMesh, _target: usize, _locked: &[bool]) -> Result<f32> {
            mesh.triangles.clear();
            Ok(0.0)
        }
    }

    /// Fails with a non-collaborator error
    struct Broken;

    impl Simplifier for Broken {
        fn simplify(&self, _mesh: &mut SubMesh, _target: usize, _locked: &[bool]) -> Result<f32> {
            Err(Error::IntegrityViolation("broken".to_string()))
        }
    }

    fn pool() -> Result<WorkerPool> {
        WorkerPool::new(&ThreadPoolConfig::default().with_threads(2))
    }

    fn small_config() -> BuildConfig {
        BuildConfig::default()
            .with_faces_per_cluster(16)
            .with_clusters_per_node(4)
    }

    // ---- contract tests ----

    #[test]
    fn test_check_accepts_unchanged_mesh() -> Result<()> {
        let mesh = grid_submesh(4);
        let locked = vec![true; mesh.positions.len()];
        check_simplified(&mesh.positions, &locked, &mesh, false)
    }

    #[test]
    fn test_check_rejects_moved_locked_position() {
        let mut mesh = grid_submesh(4);
        let before = mesh.positions.clone();
        let mut locked = vec![false; before.len()];
        locked[0] = true;
        mesh.positions[1].x += 1.0;
        assert!(check_simplified(&before, &locked, &mesh, false).is_ok());

        mesh.positions[0].x = f32::from_bits(mesh.positions[0].x.to_bits() + 1);
        let err = check_simplified(&before, &locked, &mesh, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure);
    }

    #[test]
    fn test_check_rejects_shape_changes() {
        let mesh = grid_submesh(4);
        let locked = vec![false; mesh.positions.len()];

        let mut fewer = mesh.clone();
        fewer.positions.pop();
        assert!(check_simplified(&mesh.positions, &locked, &fewer, false).is_err());

        let mut empty = mesh.clone();
        empty.triangles.clear();
        assert!(check_simplified(&mesh.positions, &locked, &empty, false).is_err());

        let mut bad_index = mesh.clone();
        bad_index.triangles[0].w[0] = 10_000;
        assert!(check_simplified(&mesh.positions, &locked, &bad_index, false).is_err());

        assert!(check_simplified(&mesh.positions, &locked, &mesh, true).is_err());
    }

    // ---- micronode tests ----

    #[test]
    fn test_micronode_delta_with_identity() -> Result<()> {
        let level = clustered_grid(12)?;
        let config = small_config();
        let pool = pool()?;
        let processor = LevelProcessor::new(&config, &Identity, &pool);
        let owners = position_owners(&level);

        let delta = processor.process_micronode(&level, &owners, 0)?;
        let node = &level.micronodes[0];
        assert_eq!(delta.micronode, 0);
        assert_eq!(delta.triangle_count(), node.triangle_count as usize);
        assert_eq!(
            delta.clusters.iter().map(|c| c.0 as usize).sum::<usize>(),
            delta.triangle_count()
        );
        for &(p, position) in &delta.owned_positions {
            assert_eq!(owners[p as usize], 0);
            assert_eq!(level.positions[p as usize], position);
        }
        Ok(())
    }

    #[test]
    fn test_micronode_halves_triangles() -> Result<()> {
        let level = clustered_grid(12)?;
        let config = small_config();
        let pool = pool()?;
        let simplifier = EdgeCollapseSimplifier::new();
        let processor = LevelProcessor::new(&config, &simplifier, &pool);
        let owners = position_owners(&level);

        for m in 0..level.micronode_count() {
            let delta = processor.process_micronode(&level, &owners, m)?;
            assert!(delta.triangle_count() < level.micronodes[m].triangle_count as usize);
            assert!(delta.error >= 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_moving_locked_positions_is_collaborator_failure() -> Result<()> {
        let mut level = clustered_grid(12)?;
        let config = small_config();
        let pool = pool()?;
        let processor = LevelProcessor::new(&config, &Jitter, &pool);
        let err = processor.process_level(&mut level).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure);
        assert!(matches!(err, Error::Micronode { level: 0, .. }));
        Ok(())
    }

    #[test]
    fn test_empty_result_is_collaborator_failure() -> Result<()> {
        let mut level = clustered_grid(12)?;
        let config = small_config();
        let pool = pool()?;
        let err = LevelProcessor::new(&config, &Eraser, &pool)
            .process_level(&mut level)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure);

        let err = LevelProcessor::new(&config, &Broken, &pool)
            .process_level(&mut level)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure);
        Ok(())
    }

    // ---- level tests ----

    #[test]
    fn test_process_level_links_and_shrinks() -> Result<()> {
        let mut level = clustered_grid(12)?;
        let config = small_config();
        let pool = pool()?;
        let simplifier = EdgeCollapseSimplifier::new();
        let processor = LevelProcessor::new(&config, &simplifier, &pool);
        let positions_before = level.positions.to_vec();
        let triangles_before = level.triangles.to_vec();

        let next = processor.process_level(&mut level)?;
        next.validate()?;
        assert_eq!(next.level, 1);
        assert!(next.triangle_count() < level.triangle_count());
        assert!(next.micronode_count() < level.micronode_count());

        // The consumed level keeps its geometry
        assert_eq!(level.positions.to_vec(), positions_before);
        assert_eq!(level.triangles.to_vec(), triangles_before);

        for (m, node) in level.micronodes.iter().enumerate() {
            assert!(!node.children_nodes.is_empty());
            for &c in &node.children_nodes {
                assert_eq!(next.clusters[c as usize].source_node, m as Index);
            }
        }
        Ok(())
    }

    #[test]
    fn test_identity_keeps_triangle_count() -> Result<()> {
        let mut level = clustered_grid(12)?;
        let config = small_config();
        let pool = pool()?;
        let next = LevelProcessor::new(&config, &Identity, &pool).process_level(&mut level)?;
        assert_eq!(next.triangle_count(), level.triangle_count());
        assert_eq!(next.position_count(), level.position_count());
        assert!(next.micronode_count() < level.micronode_count());
        Ok(())
    }
}
