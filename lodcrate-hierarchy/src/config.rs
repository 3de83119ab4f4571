//! Build configuration
//!
//! The builder never parses user input itself; callers hand it a
//! [`BuildConfig`] and [`BuildConfig::validate`] rejects unusable values.

use lodcrate_algorithms::{ClusteringStrategy, RefinementParams};
use lodcrate_core::{Error, LevelStorage, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MAX_FACES_PER_CLUSTER: usize = 65536;
pub const MIN_CLUSTERS_PER_NODE: usize = 2;
pub const MAX_CLUSTERS_PER_NODE: usize = 64;

/// Parameters of a hierarchy build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Triangle budget of a cluster
    pub faces_per_cluster: usize,
    /// Clusters grouped into one micronode
    pub clusters_per_node: usize,
    pub strategy: ClusteringStrategy,
    /// Worker threads (None = number of logical CPUs)
    pub num_threads: Option<usize>,
    pub refinement: RefinementParams,
    pub storage: LevelStorage,
    /// Run the bottom-up error and sphere saturation after the root is reached
    pub saturate: bool,
    /// Write per-level PLY files colored by cluster and micronode
    pub debug_ply_dir: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            faces_per_cluster: 128,
            clusters_per_node: 4,
            strategy: ClusteringStrategy::default(),
            num_threads: None,
            refinement: RefinementParams::default(),
            storage: LevelStorage::default(),
            saturate: true,
            debug_ply_dir: None,
        }
    }
}

impl BuildConfig {
    pub fn with_faces_per_cluster(mut self, faces: usize) -> Self {
        self.faces_per_cluster = faces;
        self
    }

    pub fn with_clusters_per_node(mut self, clusters: usize) -> Self {
        self.clusters_per_node = clusters;
        self
    }

    pub fn with_strategy(mut self, strategy: ClusteringStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_refinement(mut self, refinement: RefinementParams) -> Self {
        self.refinement = refinement;
        self
    }

    pub fn with_storage(mut self, storage: LevelStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_saturation(mut self, saturate: bool) -> Self {
        self.saturate = saturate;
        self
    }

    pub fn with_debug_ply_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_ply_dir = Some(dir.into());
        self
    }

    /// Size of the sub-clusters level 0's coarse clusters are split into
    pub fn sub_cluster_size(&self) -> usize {
        self.faces_per_cluster
            .div_ceil(self.clusters_per_node.max(1))
            .max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FACES_PER_CLUSTER).contains(&self.faces_per_cluster) {
            return Err(Error::Configuration(format!(
                "faces_per_cluster must be in 1..={}, got {}",
                MAX_FACES_PER_CLUSTER, self.faces_per_cluster
            )));
        }
        if !(MIN_CLUSTERS_PER_NODE..=MAX_CLUSTERS_PER_NODE).contains(&self.clusters_per_node) {
            return Err(Error::Configuration(format!(
                "clusters_per_node must be in {}..={}, got {}",
                MIN_CLUSTERS_PER_NODE, MAX_CLUSTERS_PER_NODE, self.clusters_per_node
            )));
        }
        if self.num_threads == Some(0) {
            return Err(Error::Configuration(
                "num_threads must be at least 1".to_string(),
            ));
        }
        let r = &self.refinement;
        if r.batch_size == 0 {
            return Err(Error::Configuration(
                "refinement batch_size must be at least 1".to_string(),
            ));
        }
        for (name, w) in [
            ("w_topology", r.w_topology),
            ("w_size", r.w_size),
            ("w_distance", r.w_distance),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Configuration(format!(
                    "refinement weight {} must be finite and non-negative, got {}",
                    name, w
                )));
            }
        }
        Ok(())
    }
}
