//! Mesh builders shared by the unit tests

use lodcrate_algorithms::{
    build_adjacency, build_clusters, build_micronodes, recompute_normals, spatial_sort,
    ClusteringStrategy, RefinementParams,
};
use lodcrate_core::{
    Index, IngestedMesh, LevelMesh, LevelStorage, Point3f, Result, SubMesh, Triangle, Wedge,
};

/// `size` x `size` vertices on a gently curved sheet
pub fn grid_positions(size: usize) -> Vec<Point3f> {
    let mut positions = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let z = 0.1 * ((x as f32) * 0.7).sin() * ((y as f32) * 0.5).cos();
            positions.push(Point3f::new(x as f32, y as f32, z));
        }
    }
    positions
}

pub fn grid_faces(size: usize) -> Vec<[Index; 3]> {
    let mut faces = Vec::with_capacity((size - 1) * (size - 1) * 2);
    for y in 0..size - 1 {
        for x in 0..size - 1 {
            let tl = (y * size + x) as Index;
            let tr = tl + 1;
            let bl = tl + size as Index;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    faces
}

pub fn grid_mesh(size: usize) -> IngestedMesh {
    IngestedMesh::from_indexed(grid_positions(size), &grid_faces(size))
}

pub fn grid_submesh(size: usize) -> SubMesh {
    let positions = grid_positions(size);
    SubMesh {
        wedges: (0..positions.len() as Index)
            .map(Wedge::position_only)
            .collect(),
        triangles: grid_faces(size)
            .into_iter()
            .map(|w| Triangle { w })
            .collect(),
        positions,
        material_ids: Vec::new(),
    }
}

/// Sorted level 0 with normals and adjacency
pub fn level_zero(size: usize) -> Result<LevelMesh> {
    let mut level = LevelMesh::from_ingested(&LevelStorage::Temporary, &grid_mesh(size))?;
    spatial_sort(&mut level)?;
    recompute_normals(&mut level)?;
    build_adjacency(&mut level)?;
    Ok(level)
}

/// Level 0 with greedy clusters of 16 triangles grouped by four
pub fn clustered_grid(size: usize) -> Result<LevelMesh> {
    let mut level = level_zero(size)?;
    build_clusters(
        &mut level,
        16,
        ClusteringStrategy::Greedy,
        &RefinementParams::default(),
    )?;
    build_micronodes(&mut level, 4, ClusteringStrategy::Greedy, None)?;
    Ok(level)
}
