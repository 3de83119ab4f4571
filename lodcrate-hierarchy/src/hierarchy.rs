//! Hierarchy construction from an ingested mesh down to a single root

use crate::config::BuildConfig;
use crate::debug_export::export_level_debug;
use crate::parallel::{ThreadPoolConfig, WorkerPool};
use crate::processor::LevelProcessor;
use crate::saturate::{saturate_levels, source_micronodes};
use lodcrate_algorithms::{
    build_adjacency, build_clusters, recompute_normals, spatial_sort, split_clusters,
};
use lodcrate_core::{
    Error, Index, IngestedMesh, LevelMesh, Parametrizer, Result, Simplifier, NONE,
};
use lodcrate_simplification::EdgeCollapseSimplifier;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span};

/// Levels from finest (0) to the root level
#[derive(Debug)]
pub struct MeshHierarchy {
    levels: Vec<LevelMesh>,
}

impl MeshHierarchy {
    pub fn levels(&self) -> &[LevelMesh] {
        &self.levels
    }

    pub fn level(&self, level: usize) -> Option<&LevelMesh> {
        self.levels.get(level)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// The coarsest level, holding the single root micronode
    pub fn root_level(&self) -> Option<&LevelMesh> {
        self.levels.last()
    }

    pub fn micronode_counts(&self) -> Vec<usize> {
        self.levels.iter().map(LevelMesh::micronode_count).collect()
    }

    pub fn triangle_counts(&self) -> Vec<usize> {
        self.levels.iter().map(LevelMesh::triangle_count).collect()
    }

    pub fn into_levels(self) -> Vec<LevelMesh> {
        self.levels
    }

    /// Micronodes of level `level - 1` that micronode `micronode` of `level`
    /// was built from.
    pub fn child_micronodes(&self, level: usize, micronode: usize) -> Result<Vec<Index>> {
        let node = self
            .levels
            .get(level)
            .and_then(|l| l.micronodes.get(micronode).map(|n| (l, n)));
        match node {
            Some((l, n)) => Ok(source_micronodes(l, n)),
            None => Err(Error::Configuration(format!(
                "no micronode {} in level {}",
                micronode, level
            ))),
        }
    }

    /// Checks that `Cluster::source_node` and `MicroNode::children_nodes`
    /// describe the same edges between every pair of adjacent levels.
    pub fn validate_links(&self) -> Result<()> {
        let Some(first) = self.levels.first() else {
            return Ok(());
        };
        if let Some(c) = first.clusters.iter().position(|c| c.source_node != NONE) {
            return Err(Error::IntegrityViolation(format!(
                "level 0 cluster {} has a source micronode",
                c
            )));
        }

        for pair in self.levels.windows(2) {
            let (finer, coarser) = (&pair[0], &pair[1]);
            for (c, cluster) in coarser.clusters.iter().enumerate() {
                let listed = finer
                    .micronodes
                    .get(cluster.source_node as usize)
                    .map(|m| m.children_nodes.contains(&(c as Index)))
                    .unwrap_or(false);
                if !listed {
                    return Err(Error::IntegrityViolation(format!(
                        "level {} cluster {} is not a child of its source micronode {}",
                        coarser.level, c, cluster.source_node
                    )));
                }
            }
            for (m, node) in finer.micronodes.iter().enumerate() {
                if node.children_nodes.is_empty() {
                    return Err(Error::IntegrityViolation(format!(
                        "level {} micronode {} has no children",
                        finer.level, m
                    )));
                }
                for &c in &node.children_nodes {
                    let back = coarser
                        .clusters
                        .get(c as usize)
                        .map(|cluster| cluster.source_node == m as Index)
                        .unwrap_or(false);
                    if !back {
                        return Err(Error::IntegrityViolation(format!(
                            "level {} micronode {} lists cluster {} it did not produce",
                            finer.level, m, c
                        )));
                    }
                }
            }
        }

        if let Some(root) = self.levels.last() {
            if root.micronodes.iter().any(|m| !m.children_nodes.is_empty()) {
                return Err(Error::IntegrityViolation(
                    "root level micronodes have children".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Builds a [`MeshHierarchy`] with a configurable simplifier and an
/// optional parametrization pass.
pub struct HierarchyBuilder {
    config: BuildConfig,
    simplifier: Arc<dyn Simplifier>,
    parametrizer: Option<Arc<dyn Parametrizer>>,
}

impl HierarchyBuilder {
    /// Uses the quadric edge-collapse simplifier
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            simplifier: Arc::new(EdgeCollapseSimplifier::new()),
            parametrizer: None,
        }
    }

    pub fn with_simplifier(mut self, simplifier: Arc<dyn Simplifier>) -> Self {
        self.simplifier = simplifier;
        self
    }

    pub fn with_parametrizer(mut self, parametrizer: Arc<dyn Parametrizer>) -> Self {
        self.parametrizer = Some(parametrizer);
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn build(&self, mesh: &IngestedMesh) -> Result<MeshHierarchy> {
        self.config.validate()?;
        let mut pool_config = ThreadPoolConfig::default();
        pool_config.num_threads = self.config.num_threads;
        let pool = WorkerPool::new(&pool_config)?;

        let span = info_span!(
            "build_hierarchy",
            triangles = mesh.triangles.len(),
            threads = pool.num_threads()
        );
        let _guard = span.enter();
        let started = Instant::now();

        let levels = pool.install(|| self.build_levels(mesh, &pool))?;
        let mut hierarchy = MeshHierarchy { levels };
        if self.config.saturate {
            saturate_levels(&mut hierarchy.levels);
        }
        for level in hierarchy.levels.iter_mut() {
            level.flush()?;
        }

        info!(
            levels = hierarchy.level_count(),
            root_triangles = hierarchy
                .root_level()
                .map(LevelMesh::triangle_count)
                .unwrap_or(0),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hierarchy built"
        );
        Ok(hierarchy)
    }

    fn build_levels(&self, mesh: &IngestedMesh, pool: &WorkerPool) -> Result<Vec<LevelMesh>> {
        let level0 = self.init_level0(mesh).map_err(|e| e.in_level(0))?;
        self.after_level(&level0)?;

        let processor = LevelProcessor::new(&self.config, self.simplifier.as_ref(), pool);
        let mut levels = vec![level0];
        while let Some(current) = levels.last_mut() {
            if current.micronode_count() <= 1 {
                break;
            }
            let mut next = processor.process_level(current)?;
            if let Some(parametrizer) = &self.parametrizer {
                let index = next.level;
                parametrizer
                    .parametrize(&mut next)
                    .map_err(|e| e.in_level(index))?;
            }
            self.after_level(&next)?;
            levels.push(next);
        }
        Ok(levels)
    }

    /// Sort, normals, adjacency, clustering and the initial micronodes
    fn init_level0(&self, mesh: &IngestedMesh) -> Result<LevelMesh> {
        let span = info_span!("level0_init");
        let _guard = span.enter();
        let started = Instant::now();

        let mut level = LevelMesh::from_ingested(&self.config.storage, mesh)?;
        spatial_sort(&mut level)?;
        if !level.attributes.has_normals {
            recompute_normals(&mut level)?;
        }
        level.update_bounds();
        build_adjacency(&mut level)?;
        build_clusters(
            &mut level,
            self.config.faces_per_cluster,
            self.config.strategy,
            &self.config.refinement,
        )?;
        split_clusters(
            &mut level,
            self.config.sub_cluster_size(),
            self.config.clusters_per_node,
        )?;
        level.validate()?;
        if let Some(parametrizer) = &self.parametrizer {
            parametrizer.parametrize(&mut level)?;
        }

        info!(
            level = 0,
            triangles = level.triangle_count(),
            positions = level.position_count(),
            clusters = level.cluster_count(),
            micronodes = level.micronode_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "level built"
        );
        Ok(level)
    }

    fn after_level(&self, level: &LevelMesh) -> Result<()> {
        if let Some(dir) = &self.config.debug_ply_dir {
            export_level_debug(level, dir).map_err(|e| e.in_level(level.level))?;
        }
        Ok(())
    }
}

/// Builds a hierarchy with the default simplifier and no parametrization
pub fn build_hierarchy(mesh: &IngestedMesh, config: BuildConfig) -> Result<MeshHierarchy> {
    HierarchyBuilder::new(config).build(mesh)
}
