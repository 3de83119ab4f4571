//! PLY dumps of a level for visual inspection
//!
//! Every triangle gets its own three vertices so adjacent clusters can be
//! told apart by color.

use lodcrate_core::{LevelMesh, Result, NONE};
use ply_rs::{
    ply::{
        Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType, ScalarType,
    },
    writer::Writer,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// What the vertex colors identify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    ByCluster,
    ByMicroNode,
}

impl ColorMode {
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ColorMode::ByCluster => "clusters",
            ColorMode::ByMicroNode => "micronodes",
        }
    }
}

/// Pastel color derived from an integer hash of `index`, each channel in 128..=255.
pub fn color_for_index(index: u32) -> [u8; 3] {
    let mut seed = index.wrapping_mul(2654435761);
    seed ^= seed >> 16;
    seed = seed.wrapping_mul(0x85eb_ca6b);
    seed ^= seed >> 13;
    let bytes = seed.to_le_bytes();
    [bytes[0] / 2 + 128, bytes[1] / 2 + 128, bytes[2] / 2 + 128]
}

fn scalar(name: &str, scalar: ScalarType) -> PropertyDef {
    PropertyDef::new(name.to_string(), PropertyType::Scalar(scalar))
}

/// Color key of every triangle under `mode`
fn triangle_keys(level: &LevelMesh, mode: ColorMode) -> Vec<u32> {
    let clusters = level.triangle_to_cluster.as_slice();
    match mode {
        ColorMode::ByCluster => clusters.to_vec(),
        ColorMode::ByMicroNode => {
            let mut node_of_cluster = vec![NONE; level.cluster_count()];
            for (m, node) in level.micronodes.iter().enumerate() {
                for &c in &node.cluster_ids {
                    node_of_cluster[c as usize] = m as u32;
                }
            }
            clusters
                .iter()
                .map(|&c| node_of_cluster.get(c as usize).copied().unwrap_or(NONE))
                .collect()
        }
    }
}

/// Writes `level` as an ASCII PLY with unshared, colored vertices.
pub fn export_level_ply<P: AsRef<Path>>(level: &LevelMesh, path: P, mode: ColorMode) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let keys = triangle_keys(level, mode);

    let mut ply = Ply::<DefaultElement>::new();

    let mut vertex_element = ElementDef::new("vertex".to_string());
    vertex_element.count = level.triangle_count() * 3;
    for axis in ["x", "y", "z"] {
        vertex_element.properties.add(scalar(axis, ScalarType::Float));
    }
    for channel in ["red", "green", "blue"] {
        vertex_element.properties.add(scalar(channel, ScalarType::UChar));
    }
    ply.header.elements.add(vertex_element);

    let mut face_element = ElementDef::new("face".to_string());
    face_element.count = level.triangle_count();
    face_element.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    ply.header.elements.add(face_element);

    let mut vertices = Vec::with_capacity(level.triangle_count() * 3);
    let mut faces = Vec::with_capacity(level.triangle_count());
    for t in 0..level.triangle_count() {
        let [r, g, b] = color_for_index(keys[t]);
        for corner in level.triangle_corners(t) {
            let mut vertex = DefaultElement::new();
            vertex.insert("x".to_string(), Property::Float(corner.x));
            vertex.insert("y".to_string(), Property::Float(corner.y));
            vertex.insert("z".to_string(), Property::Float(corner.z));
            vertex.insert("red".to_string(), Property::UChar(r));
            vertex.insert("green".to_string(), Property::UChar(g));
            vertex.insert("blue".to_string(), Property::UChar(b));
            vertices.push(vertex);
        }
        let base = (t * 3) as i32;
        let mut face = DefaultElement::new();
        face.insert(
            "vertex_indices".to_string(),
            Property::ListInt(vec![base, base + 1, base + 2]),
        );
        faces.push(face);
    }
    ply.payload.insert("vertex".to_string(), vertices);
    ply.payload.insert("face".to_string(), faces);

    Writer::new().write_ply(&mut writer, &mut ply)?;
    Ok(())
}

/// Writes `level_<L>_clusters.ply` and `level_<L>_micronodes.ply` into `dir`.
pub fn export_level_debug<P: AsRef<Path>>(level: &LevelMesh, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    for mode in [ColorMode::ByCluster, ColorMode::ByMicroNode] {
        let name = format!("level_{}_{}.ply", level.level, mode.file_suffix());
        export_level_ply(level, dir.join(name), mode)?;
    }
    Ok(())
}
