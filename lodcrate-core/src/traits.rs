//! Collaborator traits the hierarchy builder calls into

use crate::level::LevelMesh;
use crate::submesh::SubMesh;
use crate::Result;

/// Reduces the triangle count of a submesh.
///
/// Implementations must:
/// - keep `mesh.positions.len()` unchanged (collapsed positions simply become unreferenced)
/// - leave every position with `locked[i] == true` bit-identical
/// - return a valid wedge/triangle mesh with at least one triangle
/// - keep `material_ids` parallel to `triangles` when it is non-empty
///
/// The returned value is the achieved geometric error.
pub trait Simplifier: Send + Sync {
    fn simplify(
        &self,
        mesh: &mut SubMesh,
        target_triangle_count: usize,
        locked: &[bool],
    ) -> Result<f32>;
}

/// Optional post-pass run after a level has been clustered. May add or
/// update texcoords and wedge texcoord indices.
pub trait Parametrizer: Send + Sync {
    fn parametrize(&self, level: &mut LevelMesh) -> Result<()>;
}
