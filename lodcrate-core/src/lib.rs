//! Core data structures and traits for lodcrate
//!
//! This crate provides the data model shared by every stage of hierarchy
//! construction: mesh elements, index remapping, memory-mapped level
//! storage, the error taxonomy and the traits implemented by external
//! collaborators such as simplifiers.

pub mod bounds;
pub mod error;
pub mod level;
pub mod mapped;
pub mod mesh;
pub mod point;
pub mod remap;
pub mod submesh;
pub mod traits;

pub use bounds::*;
pub use error::*;
pub use level::*;
pub use mapped::*;
pub use mesh::*;
pub use point::*;
pub use remap::*;
pub use submesh::*;
pub use traits::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector2, Vector3};

/// Common result type for lodcrate operations
pub type Result<T> = std::result::Result<T, Error>;
