//! # lodcrate
//!
//! Hierarchical level-of-detail construction for large triangle meshes.
//!
//! This is the umbrella crate that provides convenient access to all lodcrate
//! functionality. Use the individual crates for more granular control over
//! dependencies.
//!
//! ## Features
//!
//! - **Core**: Level data model, index remapping, mapped storage, errors
//! - **Algorithms**: Adjacency, spatial sorting, clustering, micronodes
//! - **Simplification**: Quadric edge collapse with locked vertices
//! - **Hierarchy**: The level-by-level merge, simplify and re-split build
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lodcrate::prelude::*;
//!
//! # fn main() -> lodcrate::Result<()> {
//! let positions = vec![
//!     Point3f::new(0.0, 0.0, 0.0),
//!     Point3f::new(1.0, 0.0, 0.0),
//!     Point3f::new(1.0, 1.0, 0.0),
//!     Point3f::new(0.0, 1.0, 0.0),
//! ];
//! let mesh = IngestedMesh::from_indexed(positions, &[[0, 1, 2], [0, 2, 3]]);
//! let hierarchy = build_hierarchy(&mesh, BuildConfig::default())?;
//! assert_eq!(hierarchy.root_level().map(|l| l.micronode_count()), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms, simplification and hierarchy
//! - `algorithms`: Per-level mesh processing
//! - `simplification`: The default simplifier
//! - `hierarchy`: Hierarchy construction (pulls in the other two)
//! - `all`: Enables all features

// Re-export core functionality
pub use lodcrate_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use lodcrate_algorithms as algorithms;

#[cfg(feature = "simplification")]
pub use lodcrate_simplification as simplification;

#[cfg(feature = "hierarchy")]
pub use lodcrate_hierarchy as hierarchy;

/// Convenient imports for common use cases
pub mod prelude {
    pub use lodcrate_core::*;

    #[cfg(feature = "algorithms")]
    pub use lodcrate_algorithms::{ClusteringStrategy, RefinementParams};

    #[cfg(feature = "simplification")]
    pub use lodcrate_simplification::EdgeCollapseSimplifier;

    #[cfg(feature = "hierarchy")]
    pub use lodcrate_hierarchy::{
        build_hierarchy, BuildConfig, ColorMode, HierarchyBuilder, MeshHierarchy,
    };
}
