//! One resolution tier of the hierarchy and the storage that backs it

use crate::mapped::MappedArray;
use crate::mesh::{Cluster, FaceAdjacency, Index, MicroNode, Triangle, Wedge, NONE};
use crate::point::{Aabb, Point3f, Vector2f, Vector3f};
use crate::{Error, Result};
use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where level arrays live
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LevelStorage {
    /// Unnamed temporary files, removed when the level is dropped
    #[default]
    Temporary,
    /// `<dir>/level_<L>/<array>.bin`, kept after the build
    Directory(PathBuf),
}

impl LevelStorage {
    pub fn array<T: Pod>(&self, level: usize, name: &str) -> Result<MappedArray<T>> {
        match self {
            LevelStorage::Temporary => MappedArray::temporary(),
            LevelStorage::Directory(dir) => {
                let level_dir = dir.join(format!("level_{}", level));
                std::fs::create_dir_all(&level_dir)?;
                MappedArray::create(level_dir.join(format!("{}.bin", name)))
            }
        }
    }
}

/// Which optional attributes the source mesh carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeFlags {
    pub has_normals: bool,
    pub has_texcoords: bool,
    pub has_materials: bool,
}

/// Geometry handed over by a mesh loader
#[derive(Debug, Clone, Default)]
pub struct IngestedMesh {
    pub positions: Vec<Point3f>,
    pub normals: Vec<Vector3f>,
    pub texcoords: Vec<Vector2f>,
    pub wedges: Vec<Wedge>,
    pub triangles: Vec<Triangle>,
    /// One id per triangle when present
    pub material_ids: Option<Vec<Index>>,
}

impl IngestedMesh {
    /// One position-only wedge per position
    pub fn from_indexed(positions: Vec<Point3f>, faces: &[[Index; 3]]) -> Self {
        let wedges = (0..positions.len() as Index)
            .map(Wedge::position_only)
            .collect();
        let triangles = faces.iter().map(|f| Triangle { w: *f }).collect();
        Self {
            positions,
            wedges,
            triangles,
            ..Default::default()
        }
    }

    pub fn attributes(&self) -> AttributeFlags {
        AttributeFlags {
            has_normals: !self.normals.is_empty(),
            has_texcoords: !self.texcoords.is_empty(),
            has_materials: self.material_ids.is_some(),
        }
    }

    /// Checks shape and index ranges
    pub fn validate(&self) -> Result<()> {
        if self.triangles.is_empty() || self.positions.is_empty() {
            return Err(Error::Configuration("input mesh is empty".to_string()));
        }
        for (i, w) in self.wedges.iter().enumerate() {
            if w.p as usize >= self.positions.len() {
                return Err(Error::Configuration(format!(
                    "wedge {} references position {} of {}",
                    i,
                    w.p,
                    self.positions.len()
                )));
            }
            if w.n != NONE && w.n as usize >= self.normals.len() {
                return Err(Error::Configuration(format!(
                    "wedge {} references normal {} of {}",
                    i,
                    w.n,
                    self.normals.len()
                )));
            }
            if w.t != NONE && w.t as usize >= self.texcoords.len() {
                return Err(Error::Configuration(format!(
                    "wedge {} references texcoord {} of {}",
                    i,
                    w.t,
                    self.texcoords.len()
                )));
            }
        }
        for (i, t) in self.triangles.iter().enumerate() {
            if t.w.iter().any(|&w| w as usize >= self.wedges.len()) {
                return Err(Error::Configuration(format!(
                    "triangle {} references a wedge outside 0..{}",
                    i,
                    self.wedges.len()
                )));
            }
        }
        if let Some(ids) = &self.material_ids {
            if ids.len() != self.triangles.len() {
                return Err(Error::Configuration(format!(
                    "{} material ids for {} triangles",
                    ids.len(),
                    self.triangles.len()
                )));
            }
        }
        Ok(())
    }
}

/// Arrays of one hierarchy level
#[derive(Debug)]
pub struct LevelMesh {
    pub level: usize,
    pub attributes: AttributeFlags,
    pub bounds: Aabb,
    pub positions: MappedArray<Point3f>,
    pub normals: MappedArray<Vector3f>,
    pub texcoords: MappedArray<Vector2f>,
    pub wedges: MappedArray<Wedge>,
    pub triangles: MappedArray<Triangle>,
    /// Empty unless `attributes.has_materials`
    pub material_ids: MappedArray<Index>,
    pub adjacency: MappedArray<FaceAdjacency>,
    pub clusters: MappedArray<Cluster>,
    pub triangle_to_cluster: MappedArray<Index>,
    pub micronodes: Vec<MicroNode>,
}

impl LevelMesh {
    /// Empty arrays for `level`
    pub fn create(storage: &LevelStorage, level: usize) -> Result<Self> {
        Ok(Self {
            level,
            attributes: AttributeFlags::default(),
            bounds: Aabb::empty(),
            positions: storage.array(level, "positions")?,
            normals: storage.array(level, "normals")?,
            texcoords: storage.array(level, "texcoords")?,
            wedges: storage.array(level, "wedges")?,
            triangles: storage.array(level, "triangles")?,
            material_ids: storage.array(level, "material_ids")?,
            adjacency: storage.array(level, "adjacency")?,
            clusters: storage.array(level, "clusters")?,
            triangle_to_cluster: storage.array(level, "triangle_to_cluster")?,
            micronodes: Vec::new(),
        })
    }

    /// Level 0 from loader output
    pub fn from_ingested(storage: &LevelStorage, mesh: &IngestedMesh) -> Result<Self> {
        mesh.validate()?;
        let mut level = Self::create(storage, 0)?;
        level.attributes = mesh.attributes();
        level.positions.assign(&mesh.positions)?;
        level.normals.assign(&mesh.normals)?;
        level.texcoords.assign(&mesh.texcoords)?;
        level.wedges.assign(&mesh.wedges)?;
        level.triangles.assign(&mesh.triangles)?;
        if let Some(ids) = &mesh.material_ids {
            level.material_ids.assign(ids)?;
        }
        level.update_bounds();
        Ok(level)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn micronode_count(&self) -> usize {
        self.micronodes.len()
    }

    pub fn update_bounds(&mut self) {
        self.bounds = Aabb::from_points(self.positions.iter());
    }

    /// Position indices of a triangle's corners
    #[inline]
    pub fn triangle_positions(&self, triangle: usize) -> [Index; 3] {
        let wedges = self.wedges.as_slice();
        self.triangles[triangle].w.map(|w| wedges[w as usize].p)
    }

    pub fn triangle_corners(&self, triangle: usize) -> [Point3f; 3] {
        let positions = self.positions.as_slice();
        self.triangle_positions(triangle)
            .map(|p| positions[p as usize])
    }

    pub fn triangle_centroid(&self, triangle: usize) -> Point3f {
        let [a, b, c] = self.triangle_corners(triangle);
        Point3f::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Centroid of every triangle, in triangle order
    pub fn triangle_centroids(&self) -> Vec<Point3f> {
        (0..self.triangle_count())
            .map(|t| self.triangle_centroid(t))
            .collect()
    }

    /// Syncs every array to its backing file
    pub fn flush(&mut self) -> Result<()> {
        self.positions.flush()?;
        self.normals.flush()?;
        self.texcoords.flush()?;
        self.wedges.flush()?;
        self.triangles.flush()?;
        self.material_ids.flush()?;
        self.adjacency.flush()?;
        self.clusters.flush()?;
        self.triangle_to_cluster.flush()?;
        Ok(())
    }

    /// Checks the structural invariants of a finished level:
    /// index ranges, adjacency symmetry, cluster contiguity and coverage,
    /// the triangle to cluster map and micronode coverage.
    pub fn validate(&self) -> Result<()> {
        self.validate_indices()?;
        self.validate_adjacency()?;
        self.validate_clusters()?;
        self.validate_micronodes()
    }

    fn validate_indices(&self) -> Result<()> {
        let positions = self.positions.len();
        for (i, w) in self.wedges.iter().enumerate() {
            if w.p as usize >= positions {
                return Err(Error::IntegrityViolation(format!(
                    "wedge {} references position {} of {}",
                    i, w.p, positions
                )));
            }
        }
        let wedges = self.wedges.len();
        for (i, t) in self.triangles.iter().enumerate() {
            if t.w.iter().any(|&w| w as usize >= wedges) {
                return Err(Error::IntegrityViolation(format!(
                    "triangle {} references a wedge outside 0..{}",
                    i, wedges
                )));
            }
        }
        if self.attributes.has_materials && self.material_ids.len() != self.triangles.len() {
            return Err(Error::IntegrityViolation(format!(
                "{} material ids for {} triangles",
                self.material_ids.len(),
                self.triangles.len()
            )));
        }
        Ok(())
    }

    fn validate_adjacency(&self) -> Result<()> {
        let adjacency = self.adjacency.as_slice();
        if adjacency.len() != self.triangles.len() {
            return Err(Error::IntegrityViolation(format!(
                "{} adjacency records for {} triangles",
                adjacency.len(),
                self.triangles.len()
            )));
        }
        for (i, adj) in adjacency.iter().enumerate() {
            for j in adj.neighbors() {
                let back = adjacency
                    .get(j as usize)
                    .map(|other| other.contains(i as Index))
                    .unwrap_or(false);
                if !back {
                    return Err(Error::IntegrityViolation(format!(
                        "triangle {} lists {} as neighbor but not vice versa",
                        i, j
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_clusters(&self) -> Result<()> {
        let mut expected_offset = 0usize;
        for (c, cluster) in self.clusters.iter().enumerate() {
            if cluster.triangle_count == 0 {
                return Err(Error::IntegrityViolation(format!("cluster {} is empty", c)));
            }
            if cluster.triangle_offset as usize != expected_offset {
                return Err(Error::IntegrityViolation(format!(
                    "cluster {} starts at {} instead of {}",
                    c, cluster.triangle_offset, expected_offset
                )));
            }
            expected_offset += cluster.triangle_count as usize;
        }
        if expected_offset != self.triangles.len() {
            return Err(Error::IntegrityViolation(format!(
                "clusters cover {} of {} triangles",
                expected_offset,
                self.triangles.len()
            )));
        }
        if self.triangle_to_cluster.len() != self.triangles.len() {
            return Err(Error::IntegrityViolation(format!(
                "triangle to cluster map has {} entries for {} triangles",
                self.triangle_to_cluster.len(),
                self.triangles.len()
            )));
        }
        for (c, cluster) in self.clusters.iter().enumerate() {
            for t in cluster.triangle_range() {
                if self.triangle_to_cluster[t] as usize != c {
                    return Err(Error::IntegrityViolation(format!(
                        "triangle {} maps to cluster {} but lies in cluster {}",
                        t, self.triangle_to_cluster[t], c
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_micronodes(&self) -> Result<()> {
        if self.micronodes.is_empty() {
            return Ok(());
        }
        let mut owner = vec![NONE; self.clusters.len()];
        for (m, node) in self.micronodes.iter().enumerate() {
            if node.cluster_ids.is_empty() {
                return Err(Error::IntegrityViolation(format!("micronode {} is empty", m)));
            }
            for &c in &node.cluster_ids {
                match owner.get_mut(c as usize) {
                    Some(slot) if *slot == NONE => *slot = m as Index,
                    Some(slot) => {
                        return Err(Error::IntegrityViolation(format!(
                            "cluster {} belongs to micronodes {} and {}",
                            c, slot, m
                        )))
                    }
                    None => {
                        return Err(Error::IntegrityViolation(format!(
                            "micronode {} references cluster {} of {}",
                            m,
                            c,
                            self.clusters.len()
                        )))
                    }
                }
            }
        }
        if let Some(c) = owner.iter().position(|&o| o == NONE) {
            return Err(Error::IntegrityViolation(format!(
                "cluster {} belongs to no micronode",
                c
            )));
        }
        Ok(())
    }
}
