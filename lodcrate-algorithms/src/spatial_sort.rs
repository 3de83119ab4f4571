//! Morton-order sorting and vertex deduplication
//!
//! Positions are ordered along a 63-bit Z-order curve and near-coincident
//! points are merged. Wedges are then grouped by position and merged when
//! their attributes match, and triangles are ordered by their smallest wedge.

use lodcrate_core::{Index, LevelMesh, Point3f, Remap, Result, Triangle, Vector2f, Vector3f, Wedge, NONE};
use tracing::debug;

/// Largest quantized coordinate (21 bits per axis)
pub const MORTON_MAX: f32 = 2_097_151.0;
/// Component-wise tolerance for merging wedge normals
pub const NORMAL_EPSILON: f32 = 1e-4;
/// Component-wise tolerance for merging wedge texcoords
pub const TEXCOORD_EPSILON: f32 = 1e-5;

// ============================================================
// Morton codes
// ============================================================

/// Spreads the low 21 bits of `v` so that two zero bits follow each one.
pub fn expand_bits_21(v: u64) -> u64 {
    let mut x = v & 0x1f_ffff;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// Interleaves quantized coordinates, x in the lowest bit.
pub fn morton_code(normalized: [f32; 3]) -> u64 {
    let q = normalized.map(|c| (c.clamp(0.0, 1.0) * MORTON_MAX) as u64);
    expand_bits_21(q[0]) | (expand_bits_21(q[1]) << 1) | (expand_bits_21(q[2]) << 2)
}

/// Maps positions into the unit cube of their bounds (uniform scale) and
/// returns their Morton codes.
pub fn morton_codes(positions: &[Point3f]) -> Vec<u64> {
    let bounds = lodcrate_core::Aabb::from_points(positions);
    let mut max_dim = bounds.max_extent();
    if !(max_dim >= 1e-6) {
        max_dim = 1.0;
    }
    positions
        .iter()
        .map(|p| {
            let n = (p - bounds.min) / max_dim;
            morton_code([n.x, n.y, n.z])
        })
        .collect()
}

// ============================================================
// Stable bottom-up merge sort
// ============================================================

/// Iterative bottom-up merge sort. Stable: equal keys keep their input order.
pub fn merge_sort_by_key<T, K, F>(items: &mut Vec<T>, key: F)
where
    T: Copy,
    K: Ord,
    F: Fn(&T) -> K,
{
    let n = items.len();
    if n < 2 {
        return;
    }
    let mut src = std::mem::take(items);
    let mut dst = Vec::with_capacity(n);
    let mut width = 1;
    while width < n {
        dst.clear();
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if key(&src[j]) < key(&src[i]) {
                    dst.push(src[j]);
                    j += 1;
                } else {
                    dst.push(src[i]);
                    i += 1;
                }
            }
            dst.extend_from_slice(&src[i..mid]);
            dst.extend_from_slice(&src[j..end]);
            start = end;
        }
        std::mem::swap(&mut src, &mut dst);
        width *= 2;
    }
    *items = src;
}

// ============================================================
// Spatial sort
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpatialSortReport {
    pub positions_before: usize,
    pub positions_after: usize,
    pub wedges_before: usize,
    pub wedges_after: usize,
    pub triangles: usize,
}

impl SpatialSortReport {
    pub fn merged_positions(&self) -> usize {
        self.positions_before - self.positions_after
    }

    pub fn merged_wedges(&self) -> usize {
        self.wedges_before - self.wedges_after
    }
}

/// Merges positions closer than `max(1e-9, diagonal * 1e-6)` that share a
/// Morton code. Returns the unique positions in Morton order and the
/// old-to-new position map.
pub fn deduplicate_positions(positions: &[Point3f]) -> (Vec<Point3f>, Remap) {
    let codes = morton_codes(positions);
    let mut pairs: Vec<(u64, Index)> = codes
        .iter()
        .enumerate()
        .map(|(i, &code)| (code, i as Index))
        .collect();
    merge_sort_by_key(&mut pairs, |&(code, _)| code);

    let diagonal = lodcrate_core::Aabb::from_points(positions).diagonal();
    let epsilon = (diagonal * 1e-6).max(1e-9);

    let mut unique: Vec<Point3f> = Vec::with_capacity(positions.len());
    let mut forward = vec![NONE; positions.len()];
    let mut run_code = None;
    let mut run_start = 0;
    for &(code, old) in &pairs {
        if run_code != Some(code) {
            run_code = Some(code);
            run_start = unique.len();
        }
        let p = positions[old as usize];
        let existing = (run_start..unique.len())
            .rev()
            .find(|&u| (unique[u] - p).norm() < epsilon);
        forward[old as usize] = match existing {
            Some(u) => u as Index,
            None => {
                unique.push(p);
                (unique.len() - 1) as Index
            }
        };
    }

    (unique, Remap::from_forward(forward))
}

fn attribute_matches<T, F>(a: Index, b: Index, values: &[T], close: F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    match (a, b) {
        (NONE, NONE) => true,
        (NONE, _) | (_, NONE) => false,
        _ if a == b => true,
        _ => match (values.get(a as usize), values.get(b as usize)) {
            (Some(x), Some(y)) => close(x, y),
            _ => false,
        },
    }
}

fn normals_close(a: &Vector3f, b: &Vector3f) -> bool {
    (a - b).amax() < NORMAL_EPSILON
}

fn texcoords_close(a: &Vector2f, b: &Vector2f) -> bool {
    (a - b).amax() < TEXCOORD_EPSILON
}

/// Sorts wedges (already carrying final position indices) by position and
/// merges those with matching attributes. Returns the unique wedges and the
/// composed old-to-new wedge map.
pub fn merge_wedges(
    wedges: &[Wedge],
    normals: &[Vector3f],
    texcoords: &[Vector2f],
) -> (Vec<Wedge>, Remap) {
    let mut order: Vec<Index> = (0..wedges.len() as Index).collect();
    order.sort_by_key(|&w| wedges[w as usize].p);
    let sorted_remap = Remap::from_new_order(&order, wedges.len());

    let mut unique: Vec<Wedge> = Vec::with_capacity(wedges.len());
    let mut merge_forward = vec![NONE; wedges.len()];
    let mut group_start = 0;
    for (sorted_index, &old) in order.iter().enumerate() {
        let wedge = wedges[old as usize];
        if unique.last().map(|u: &Wedge| u.p) != Some(wedge.p) {
            group_start = unique.len();
        }
        let existing = (group_start..unique.len()).find(|&u| {
            attribute_matches(unique[u].n, wedge.n, normals, normals_close)
                && attribute_matches(unique[u].t, wedge.t, texcoords, texcoords_close)
        });
        merge_forward[sorted_index] = match existing {
            Some(u) => u as Index,
            None => {
                unique.push(wedge);
                (unique.len() - 1) as Index
            }
        };
    }

    let merge_remap = Remap::from_forward(merge_forward);
    (unique, sorted_remap.compose(&merge_remap))
}

/// Reorders and deduplicates a level in place.
///
/// Adjacency, clusters and micronodes of the level are cleared since they
/// no longer match the triangle order.
pub fn spatial_sort(level: &mut LevelMesh) -> Result<SpatialSortReport> {
    let mut report = SpatialSortReport {
        positions_before: level.positions.len(),
        wedges_before: level.wedges.len(),
        triangles: level.triangles.len(),
        ..Default::default()
    };

    let (positions, position_remap) = deduplicate_positions(&level.positions);
    report.positions_after = positions.len();

    let remapped_wedges: Vec<Wedge> = level
        .wedges
        .iter()
        .map(|w| Wedge {
            p: position_remap.apply(w.p),
            ..*w
        })
        .collect();
    let (wedges, wedge_remap) = merge_wedges(&remapped_wedges, &level.normals, &level.texcoords);
    report.wedges_after = wedges.len();

    let remapped: Vec<Triangle> = level
        .triangles
        .iter()
        .map(|t| wedge_remap.apply_to_triangle(t))
        .collect();
    let mut order: Vec<Index> = (0..remapped.len() as Index).collect();
    order.sort_by_key(|&t| remapped[t as usize].min_wedge());
    let triangle_remap = Remap::from_new_order(&order, remapped.len());
    let triangles = triangle_remap.gather(&remapped);

    if level.attributes.has_materials {
        let material_ids = triangle_remap.gather(&level.material_ids);
        level.material_ids.assign(&material_ids)?;
    }
    level.positions.assign(&positions)?;
    level.wedges.assign(&wedges)?;
    level.triangles.assign(&triangles)?;
    level.adjacency.clear();
    level.clusters.clear();
    level.triangle_to_cluster.clear();
    level.micronodes.clear();
    level.update_bounds();

    debug!(
        level = level.level,
        merged_positions = report.merged_positions(),
        merged_wedges = report.merged_wedges(),
        positions = report.positions_after,
        wedges = report.wedges_after,
        "spatial sort finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::make_plane_grid;
    use lodcrate_core::{IngestedMesh, LevelStorage};

    // ---- Morton tests ----

    #[test]
    fn test_expand_bits() {
        assert_eq!(expand_bits_21(0), 0);
        assert_eq!(expand_bits_21(1), 1);
        assert_eq!(expand_bits_21(0b11), 0b1001);
        assert_eq!(expand_bits_21(0b101), 0b1_000_001);
        // Bits above 21 are ignored
        assert_eq!(expand_bits_21(1 << 21), 0);
    }

    #[test]
    fn test_morton_axis_order() {
        let unit = 1.5 / MORTON_MAX;
        assert_eq!(morton_code([unit, 0.0, 0.0]), 0b001);
        assert_eq!(morton_code([0.0, unit, 0.0]), 0b010);
        assert_eq!(morton_code([0.0, 0.0, unit]), 0b100);
        assert_eq!(morton_code([1.0, 1.0, 1.0]), (1u64 << 63) - 1);
    }

    #[test]
    fn test_morton_clamps_out_of_range() {
        assert_eq!(morton_code([-3.0, 2.0, f32::NAN]), morton_code([0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_degenerate_bounds_do_not_divide_by_zero() {
        let codes = morton_codes(&[Point3f::new(2.0, 2.0, 2.0); 3]);
        assert!(codes.iter().all(|&c| c == 0));
    }

    // ---- Merge sort tests ----

    #[test]
    fn test_merge_sort_is_stable() {
        let mut items: Vec<(u32, char)> =
            vec![(3, 'a'), (1, 'b'), (3, 'c'), (2, 'd'), (1, 'e'), (0, 'f'), (3, 'g')];
        merge_sort_by_key(&mut items, |&(k, _)| k);
        let labels: String = items.iter().map(|&(_, c)| c).collect();
        assert_eq!(labels, "fbedacg");
    }

    #[test]
    fn test_merge_sort_matches_std() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut items: Vec<u64> = (0..1000).map(|_| rng.gen_range(0..50)).collect();
        let mut expected = items.clone();
        expected.sort();
        merge_sort_by_key(&mut items, |&k| k);
        assert_eq!(items, expected);
    }

    // ---- Deduplication tests ----

    #[test]
    fn test_coincident_positions_collapse() -> Result<()> {
        // Two triangles whose shared corner was duplicated by the loader
        let mesh = IngestedMesh::from_indexed(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
            ],
            &[[0, 1, 2], [3, 4, 2]],
        );
        let mut level = LevelMesh::from_ingested(&LevelStorage::Temporary, &mesh)?;
        let report = spatial_sort(&mut level)?;

        assert_eq!(report.positions_after, 4);
        assert_eq!(report.merged_positions(), 1);
        // Wedges 1 and 3 pointed at the duplicates and carry no attributes
        assert_eq!(report.wedges_after, 4);
        let corner = Point3f::new(1.0, 0.0, 0.0);
        let survivors: Vec<Index> = (0..level.positions.len() as Index)
            .filter(|&p| level.positions[p as usize] == corner)
            .collect();
        assert_eq!(survivors.len(), 1);
        let referencing = level
            .wedges
            .iter()
            .filter(|w| level.positions[w.p as usize] == corner)
            .count();
        assert_eq!(referencing, 1);
        for t in 0..level.triangle_count() {
            let corners = level.triangle_corners(t);
            if corners.contains(&corner) {
                let p = level.triangle_positions(t);
                assert!(p.contains(&survivors[0]));
            }
        }
        Ok(())
    }

    #[test]
    fn test_all_identical_points() {
        let positions = vec![Point3f::new(0.5, 0.5, 0.5); 10];
        let (unique, remap) = deduplicate_positions(&positions);
        assert_eq!(unique.len(), 1);
        assert!(remap.as_slice().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_distinct_points_kept() {
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.0, 0.0, 1e-3),
            Point3f::new(1.0, 1.0, 1.0),
        ];
        let (unique, remap) = deduplicate_positions(&positions);
        assert_eq!(unique.len(), 3);
        assert!(remap.is_permutation());
    }

    // ---- Wedge merge tests ----

    #[test]
    fn test_wedges_merge_on_matching_attributes() {
        let normals = vec![
            Vector3f::new(0.0, 0.0, 1.0),
            Vector3f::new(0.0, 0.0, 1.0 + 1e-6),
            Vector3f::new(1.0, 0.0, 0.0),
        ];
        let wedges = vec![
            Wedge::new(1, 0, NONE),
            Wedge::new(0, 0, NONE),
            Wedge::new(1, 1, NONE),
            Wedge::new(1, 2, NONE),
        ];
        let (unique, remap) = merge_wedges(&wedges, &normals, &[]);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].p, 0);
        // Wedges 0 and 2 have nearly equal normals on position 1
        assert_eq!(remap.apply(0), remap.apply(2));
        assert_ne!(remap.apply(0), remap.apply(3));
    }

    #[test]
    fn test_missing_attribute_only_matches_missing() {
        let texcoords = vec![Vector2f::new(0.5, 0.5)];
        let wedges = vec![Wedge::new(0, NONE, 0), Wedge::new(0, NONE, NONE)];
        let (unique, _) = merge_wedges(&wedges, &[], &texcoords);
        assert_eq!(unique.len(), 2);
    }

    // ---- Level tests ----

    #[test]
    fn test_grid_sort_preserves_geometry() -> Result<()> {
        let mut level = make_plane_grid(5)?;
        let before: Vec<[Point3f; 3]> = (0..level.triangle_count())
            .map(|t| level.triangle_corners(t))
            .collect();
        let report = spatial_sort(&mut level)?;
        assert_eq!(report.merged_positions(), 0);
        assert_eq!(report.triangles, 32);

        let mut after: Vec<[Point3f; 3]> = (0..level.triangle_count())
            .map(|t| level.triangle_corners(t))
            .collect();
        let key = |t: &[Point3f; 3]| {
            t.iter()
                .map(|p| (p.x * 10.0 + p.y * 1000.0) as i64)
                .collect::<Vec<_>>()
        };
        let mut before_sorted = before.clone();
        before_sorted.sort_by_key(key);
        after.sort_by_key(key);
        assert_eq!(before_sorted, after);

        // Triangles are ordered by their smallest wedge
        let mins: Vec<Index> = level.triangles.iter().map(|t| t.min_wedge()).collect();
        assert!(mins.windows(2).all(|w| w[0] <= w[1]));
        Ok(())
    }

    #[test]
    fn test_material_ids_follow_triangles() -> Result<()> {
        let mut mesh = crate::fixtures::make_grid_mesh(3, 3);
        let ids: Vec<Index> = (0..mesh.triangles.len() as Index).collect();
        let tagged: Vec<[Point3f; 3]> = mesh
            .triangles
            .iter()
            .map(|t| t.w.map(|w| mesh.positions[w as usize]))
            .collect();
        mesh.material_ids = Some(ids);
        let mut level = LevelMesh::from_ingested(&LevelStorage::Temporary, &mesh)?;
        spatial_sort(&mut level)?;
        for t in 0..level.triangle_count() {
            let id = level.material_ids[t] as usize;
            assert_eq!(level.triangle_corners(t), tagged[id]);
        }
        Ok(())
    }
}
