//! # lodcrate hierarchy
//!
//! Builds a multi-resolution cluster hierarchy from an ingested mesh.
//!
//! Level 0 is sorted, clustered and split into micronodes. Each further level
//! is derived by merging every micronode's clusters, simplifying the merged
//! patch with its seams locked and re-splitting the result into clusters,
//! until a single root micronode remains.

pub mod config;
pub mod debug_export;
pub mod hierarchy;
pub mod merge;
pub mod parallel;
pub mod processor;
pub mod resplit;
pub mod saturate;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use config::*;
pub use debug_export::*;
pub use hierarchy::*;
pub use merge::*;
pub use parallel::*;
pub use processor::*;
pub use resplit::*;
pub use saturate::*;
