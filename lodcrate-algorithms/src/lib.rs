//! # lodcrate algorithms
//!
//! Per-level mesh processing used while building a cluster hierarchy.
//!
//! This crate provides triangle adjacency, Morton-order spatial sorting with
//! vertex deduplication, normal recomputation, compaction, METIS graph
//! partitioning, triangle clustering with refinement and the grouping of
//! clusters into micronodes.

pub mod adjacency;
pub mod clustering;
pub mod compact;
pub mod micronodes;
pub mod normals;
pub mod partition;
pub mod refine;
pub mod spatial_sort;
pub mod split;

#[cfg(test)]
mod fixtures;

// Re-export commonly used items
pub use adjacency::*;
pub use clustering::*;
pub use compact::*;
pub use micronodes::*;
pub use normals::*;
pub use partition::*;
pub use refine::*;
pub use spatial_sort::*;
pub use split::*;
