//! Mesh element types shared by every hierarchy level

use crate::point::{Point3f, Vector3f};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Index into any per-level array
pub type Index = u32;

/// Sentinel for "no element": border edges, missing attributes, dropped remap entries
pub const NONE: Index = Index::MAX;

/// A triangle corner's attribute triple.
///
/// The normal and texcoord indices point into the level's `normals` and
/// `texcoords` arrays and are `NONE` when the attribute is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct Wedge {
    pub p: Index,
    pub n: Index,
    pub t: Index,
}

unsafe impl Pod for Wedge {}
unsafe impl Zeroable for Wedge {}

impl Wedge {
    pub fn new(p: Index, n: Index, t: Index) -> Self {
        Self { p, n, t }
    }

    /// A wedge carrying only a position
    pub fn position_only(p: Index) -> Self {
        Self { p, n: NONE, t: NONE }
    }
}

/// Three wedge indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct Triangle {
    pub w: [Index; 3],
}

unsafe impl Pod for Triangle {}
unsafe impl Zeroable for Triangle {}

impl Triangle {
    pub fn new(w0: Index, w1: Index, w2: Index) -> Self {
        Self { w: [w0, w1, w2] }
    }

    pub fn min_wedge(&self) -> Index {
        self.w[0].min(self.w[1]).min(self.w[2])
    }
}

/// Opposite triangle across each edge; edge `c` runs from corner `c` to corner `(c + 1) % 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct FaceAdjacency {
    pub opp: [Index; 3],
}

unsafe impl Pod for FaceAdjacency {}
unsafe impl Zeroable for FaceAdjacency {}

impl FaceAdjacency {
    pub const BORDER: FaceAdjacency = FaceAdjacency { opp: [NONE; 3] };

    pub fn neighbors(&self) -> impl Iterator<Item = Index> + '_ {
        self.opp.iter().copied().filter(|&o| o != NONE)
    }

    pub fn contains(&self, face: Index) -> bool {
        face != NONE && self.opp.contains(&face)
    }
}

impl Default for FaceAdjacency {
    fn default() -> Self {
        Self::BORDER
    }
}

/// Center and radius of an enclosing sphere
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct BoundingSphere {
    pub center: Point3f,
    pub radius: f32,
}

unsafe impl Pod for BoundingSphere {}
unsafe impl Zeroable for BoundingSphere {}

impl BoundingSphere {
    pub fn new(center: Point3f, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn contains_point(&self, p: &Point3f, tolerance: f32) -> bool {
        (p - self.center).norm() <= self.radius + tolerance
    }

    pub fn contains_sphere(&self, other: &BoundingSphere, tolerance: f32) -> bool {
        (other.center - self.center).norm() + other.radius <= self.radius + tolerance
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Point3f::origin(),
            radius: 0.0,
        }
    }
}

/// A contiguous run of triangles with an approximate bounding sphere
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Cluster {
    pub triangle_offset: Index,
    pub triangle_count: Index,
    pub sphere: BoundingSphere,
    /// Micronode of the previous (finer) level whose simplification produced
    /// this cluster, `NONE` at level 0.
    pub source_node: Index,
}

unsafe impl Pod for Cluster {}
unsafe impl Zeroable for Cluster {}

impl Cluster {
    pub fn triangle_range(&self) -> std::ops::Range<usize> {
        let start = self.triangle_offset as usize;
        start..start + self.triangle_count as usize
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            triangle_offset: 0,
            triangle_count: 0,
            sphere: BoundingSphere::default(),
            source_node: NONE,
        }
    }
}

/// A group of clusters processed together when deriving the next level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroNode {
    pub cluster_ids: Vec<Index>,
    pub triangle_count: u32,
    /// Triangle-count weighted centroid of the member clusters
    pub centroid: Point3f,
    pub sphere: BoundingSphere,
    /// Error incurred when this node was simplified into the next level
    pub error: f32,
    /// Clusters of the next level created from this node
    pub children_nodes: Vec<Index>,
}

impl MicroNode {
    pub fn new(cluster_ids: Vec<Index>) -> Self {
        Self {
            cluster_ids,
            triangle_count: 0,
            centroid: Point3f::origin(),
            sphere: BoundingSphere::default(),
            error: 0.0,
            children_nodes: Vec::new(),
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_ids.len()
    }
}

/// Area weighted normal of a triangle (unnormalized, length = 2 * area)
pub fn face_normal(a: &Point3f, b: &Point3f, c: &Point3f) -> Vector3f {
    (b - a).cross(&(c - a))
}
