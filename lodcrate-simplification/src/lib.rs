//! Mesh simplification for lodcrate
//!
//! This crate provides the default [`lodcrate_core::Simplifier`] used when
//! deriving coarser hierarchy levels:
//! - Quadric error metrics
//! - Edge collapse with locked vertices

pub mod edge_collapse;
pub mod quadric_error;

pub use edge_collapse::*;
pub use quadric_error::*;
