//! Standalone meshes extracted from a level for simplification

use crate::mesh::{Index, Triangle, Wedge};
use crate::point::Point3f;
use crate::{Error, Result};

/// A self-contained piece of a level.
///
/// Wedge position indices are local to `positions`. Normal and texcoord
/// indices still refer to the owning level's arrays and are carried through
/// untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub positions: Vec<Point3f>,
    pub wedges: Vec<Wedge>,
    pub triangles: Vec<Triangle>,
    /// Per-triangle material ids, or empty
    pub material_ids: Vec<Index>,
}

impl SubMesh {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    #[inline]
    pub fn triangle_positions(&self, triangle: usize) -> [Index; 3] {
        self.triangles[triangle].w.map(|w| self.wedges[w as usize].p)
    }

    pub fn triangle_centroid(&self, triangle: usize) -> Point3f {
        let [a, b, c] = self
            .triangle_positions(triangle)
            .map(|p| self.positions[p as usize]);
        Point3f::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Checks that every wedge and triangle index is in range
    pub fn validate(&self) -> Result<()> {
        for (i, w) in self.wedges.iter().enumerate() {
            if w.p as usize >= self.positions.len() {
                return Err(Error::Collaborator(format!(
                    "submesh wedge {} references position {} of {}",
                    i,
                    w.p,
                    self.positions.len()
                )));
            }
        }
        for (i, t) in self.triangles.iter().enumerate() {
            if t.w.iter().any(|&w| w as usize >= self.wedges.len()) {
                return Err(Error::Collaborator(format!(
                    "submesh triangle {} references a wedge outside 0..{}",
                    i,
                    self.wedges.len()
                )));
            }
        }
        if !self.material_ids.is_empty() && self.material_ids.len() != self.triangles.len() {
            return Err(Error::Collaborator(format!(
                "submesh has {} material ids for {} triangles",
                self.material_ids.len(),
                self.triangles.len()
            )));
        }
        Ok(())
    }
}
