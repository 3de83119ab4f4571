//! Test meshes shared by the unit tests of this crate

use lodcrate_core::{Index, IngestedMesh, LevelMesh, LevelStorage, Point3f, Result};

pub fn make_quad_mesh() -> IngestedMesh {
    IngestedMesh::from_indexed(
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ],
        &[[0, 1, 2], [0, 2, 3]],
    )
}

pub fn make_quad() -> Result<LevelMesh> {
    LevelMesh::from_ingested(&LevelStorage::Temporary, &make_quad_mesh())
}

/// `nx` by `ny` quads on the z = 0 plane, two triangles per quad
pub fn make_grid_mesh(nx: usize, ny: usize) -> IngestedMesh {
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for y in 0..=ny {
        for x in 0..=nx {
            vertices.push(Point3f::new(x as f32, y as f32, 0.0));
        }
    }
    let row = nx + 1;
    let mut faces = Vec::with_capacity(nx * ny * 2);
    for y in 0..ny {
        for x in 0..nx {
            let tl = (y * row + x) as Index;
            let tr = tl + 1;
            let bl = ((y + 1) * row + x) as Index;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    IngestedMesh::from_indexed(vertices, &faces)
}

/// `size` by `size` vertices
pub fn make_plane_grid(size: usize) -> Result<LevelMesh> {
    LevelMesh::from_ingested(
        &LevelStorage::Temporary,
        &make_grid_mesh(size - 1, size - 1),
    )
}

/// Grid with a smooth bump so that normals and distances vary
pub fn make_curved_surface(size: usize) -> Result<LevelMesh> {
    let mut mesh = make_grid_mesh(size - 1, size - 1);
    for p in &mut mesh.positions {
        let fx = p.x / (size - 1) as f32 * std::f32::consts::PI;
        let fy = p.y / (size - 1) as f32 * std::f32::consts::PI;
        p.z = fx.sin() * fy.sin() * 2.0;
    }
    LevelMesh::from_ingested(&LevelStorage::Temporary, &mesh)
}
