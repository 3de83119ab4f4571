//! Removal of unreferenced vertex data

use lodcrate_core::{LevelMesh, Remap, Result, Wedge, NONE};
use tracing::debug;

/// Number of entries dropped from each array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub dropped_positions: usize,
    pub dropped_normals: usize,
    pub dropped_texcoords: usize,
    pub dropped_wedges: usize,
}

impl CompactionReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

fn mark(used: &mut [bool], index: u32) {
    if index != NONE {
        if let Some(slot) = used.get_mut(index as usize) {
            *slot = true;
        }
    }
}

/// Drops wedges no triangle references, then positions, normals and
/// texcoords no remaining wedge references. Relative order is preserved.
pub fn compact_level(level: &mut LevelMesh) -> Result<CompactionReport> {
    let mut used_wedges = vec![false; level.wedges.len()];
    for triangle in level.triangles.iter() {
        for &w in &triangle.w {
            mark(&mut used_wedges, w);
        }
    }

    let mut used_positions = vec![false; level.positions.len()];
    let mut used_normals = vec![false; level.normals.len()];
    let mut used_texcoords = vec![false; level.texcoords.len()];
    for (w, wedge) in level.wedges.iter().enumerate() {
        if used_wedges[w] {
            mark(&mut used_positions, wedge.p);
            mark(&mut used_normals, wedge.n);
            mark(&mut used_texcoords, wedge.t);
        }
    }

    let wedge_remap = Remap::from_kept(&used_wedges);
    let position_remap = Remap::from_kept(&used_positions);
    let normal_remap = Remap::from_kept(&used_normals);
    let texcoord_remap = Remap::from_kept(&used_texcoords);

    let report = CompactionReport {
        dropped_positions: position_remap.len() - position_remap.target_len(),
        dropped_normals: normal_remap.len() - normal_remap.target_len(),
        dropped_texcoords: texcoord_remap.len() - texcoord_remap.target_len(),
        dropped_wedges: wedge_remap.len() - wedge_remap.target_len(),
    };
    if report.is_noop() {
        return Ok(report);
    }

    let wedges: Vec<Wedge> = wedge_remap
        .gather(&level.wedges)
        .into_iter()
        .map(|w| Wedge {
            p: position_remap.apply(w.p),
            n: normal_remap.apply(w.n),
            t: texcoord_remap.apply(w.t),
        })
        .collect();
    let positions = position_remap.gather(&level.positions);
    let normals = normal_remap.gather(&level.normals);
    let texcoords = texcoord_remap.gather(&level.texcoords);

    level.positions.assign(&positions)?;
    level.normals.assign(&normals)?;
    level.texcoords.assign(&texcoords)?;
    level.wedges.assign(&wedges)?;
    for triangle in level.triangles.iter_mut() {
        *triangle = wedge_remap.apply_to_triangle(triangle);
    }
    level.update_bounds();

    debug!(
        level = level.level,
        dropped_positions = report.dropped_positions,
        dropped_normals = report.dropped_normals,
        dropped_texcoords = report.dropped_texcoords,
        dropped_wedges = report.dropped_wedges,
        "level compacted"
    );
    Ok(report)
}
