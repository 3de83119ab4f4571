//! Edge collapse simplification
//!
//! Iterative edge collapse driven by quadric error metrics (QEM). Topology is
//! tracked with per-vertex incidence lists over position indices, so wedges
//! sharing a position collapse together while keeping their attributes.
//! Locked vertices never move: an edge with one locked endpoint collapses
//! onto it, an edge with two is never touched.

use crate::quadric_error::{optimal_position, quadric_cost, triangle_quadric, Quadric};
use lodcrate_core::{face_normal, Error, Index, Point3f, Result, Simplifier, SubMesh, NONE};
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::trace;

// ============================================================
// Incidence mesh
// ============================================================

/// Working copy of a submesh during simplification.
struct CollapseMesh<'a> {
    positions: Vec<Point3f>,
    /// Position indices per face
    faces: Vec<[Index; 3]>,
    face_alive: Vec<bool>,
    alive_faces: usize,
    /// Alive faces touching each vertex
    vertex_faces: Vec<Vec<Index>>,
    /// Vertex a removed vertex was merged into, `NONE` while alive
    collapsed_into: Vec<Index>,
    quadrics: Vec<Quadric>,
    locked: &'a [bool],
}

impl<'a> CollapseMesh<'a> {
    fn new(mesh: &SubMesh, locked: &'a [bool]) -> Self {
        let nv = mesh.positions.len();
        let nf = mesh.triangles.len();
        let mut faces = Vec::with_capacity(nf);
        let mut face_alive = vec![true; nf];
        let mut vertex_faces = vec![Vec::new(); nv];
        let mut quadrics = vec![Quadric::zeros(); nv];

        for f in 0..nf {
            let p = mesh.triangle_positions(f);
            faces.push(p);
            if p[0] == p[1] || p[1] == p[2] || p[2] == p[0] {
                face_alive[f] = false;
                continue;
            }
            let q = triangle_quadric(
                &mesh.positions[p[0] as usize],
                &mesh.positions[p[1] as usize],
                &mesh.positions[p[2] as usize],
            );
            for &v in &p {
                vertex_faces[v as usize].push(f as Index);
                quadrics[v as usize] += q;
            }
        }

        // Keep degenerate input faces when nothing else would remain
        let mut alive_faces = face_alive.iter().filter(|&&a| a).count();
        if alive_faces == 0 {
            face_alive.iter_mut().for_each(|a| *a = true);
            alive_faces = nf;
        }

        Self {
            positions: mesh.positions.clone(),
            faces,
            face_alive,
            alive_faces,
            vertex_faces,
            collapsed_into: vec![NONE; nv],
            quadrics,
            locked,
        }
    }

    #[inline]
    fn is_locked(&self, v: Index) -> bool {
        self.locked[v as usize]
    }

    fn neighbors(&self, v: Index) -> BTreeSet<Index> {
        let mut result = BTreeSet::new();
        for &f in &self.vertex_faces[v as usize] {
            for &w in &self.faces[f as usize] {
                if w != v {
                    result.insert(w);
                }
            }
        }
        result
    }

    /// Alive faces containing both `a` and `b`
    fn edge_faces(&self, a: Index, b: Index) -> usize {
        self.vertex_faces[a as usize]
            .iter()
            .filter(|&&f| self.faces[f as usize].contains(&b))
            .count()
    }

    fn is_border_vertex(&self, v: Index) -> bool {
        self.neighbors(v)
            .into_iter()
            .any(|w| self.edge_faces(v, w) == 1)
    }

    /// Collapse target, its new position and the quadric cost, or `None`
    /// when both endpoints are locked. The first vertex is removed.
    fn plan_collapse(&self, a: Index, b: Index) -> Option<(Index, Index, Point3f, f64)> {
        let q = self.quadrics[a as usize] + self.quadrics[b as usize];
        match (self.is_locked(a), self.is_locked(b)) {
            (true, true) => None,
            (true, false) => {
                let p = self.positions[a as usize];
                Some((b, a, p, quadric_cost(&q, &p)))
            }
            (false, true) => {
                let p = self.positions[b as usize];
                Some((a, b, p, quadric_cost(&q, &p)))
            }
            (false, false) => {
                let (p, cost) =
                    optimal_position(&q, &self.positions[a as usize], &self.positions[b as usize]);
                Some((a, b, p, cost))
            }
        }
    }

    /// The link condition: the vertices adjacent to both endpoints are
    /// exactly the apices of the faces on the edge.
    fn check_link_condition(&self, a: Index, b: Index) -> bool {
        let shared = self.edge_faces(a, b);
        if shared == 0 || shared > 2 {
            return false;
        }
        let common = self.neighbors(a).intersection(&self.neighbors(b)).count();
        if common != shared {
            return false;
        }
        // Two border vertices joined by an interior edge would pinch the surface
        !(shared == 2 && self.is_border_vertex(a) && self.is_border_vertex(b))
    }

    /// True when moving `from` and `to` onto `p` turns any surviving face over
    fn flips_faces(&self, from: Index, to: Index, p: &Point3f) -> bool {
        for v in [from, to] {
            for &f in &self.vertex_faces[v as usize] {
                let face = self.faces[f as usize];
                if face.contains(&from) && face.contains(&to) {
                    continue;
                }
                let old = face.map(|i| self.positions[i as usize]);
                let new = face.map(|i| if i == v { *p } else { self.positions[i as usize] });
                let n_old = face_normal(&old[0], &old[1], &old[2]);
                if n_old.norm_squared() <= f32::MIN_POSITIVE {
                    continue;
                }
                let n_new = face_normal(&new[0], &new[1], &new[2]);
                if n_new.dot(&n_old) <= 0.0 {
                    return true;
                }
            }
        }
        false
    }

    /// Merges `from` into `to` at `p`.
    fn collapse(&mut self, from: Index, to: Index, p: Point3f) {
        let incident = std::mem::take(&mut self.vertex_faces[from as usize]);
        for f in incident {
            let face = self.faces[f as usize];
            if face.contains(&to) {
                self.face_alive[f as usize] = false;
                self.alive_faces -= 1;
                for &w in &face {
                    if w != from {
                        self.vertex_faces[w as usize].retain(|&g| g != f);
                    }
                }
            } else {
                for w in self.faces[f as usize].iter_mut() {
                    if *w == from {
                        *w = to;
                    }
                }
                self.vertex_faces[to as usize].push(f);
            }
        }

        if !self.is_locked(to) {
            self.positions[to as usize] = p;
        }
        let q = self.quadrics[from as usize];
        self.quadrics[to as usize] += q;
        self.collapsed_into[from as usize] = to;
    }

    /// Follows collapse chains to the surviving vertex
    fn resolve(&self, mut v: Index) -> Index {
        while self.collapsed_into[v as usize] != NONE {
            v = self.collapsed_into[v as usize];
        }
        v
    }
}

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

#[derive(Debug, Clone, Copy)]
struct EdgeCost {
    /// Quadric cost plus any border penalty
    priority: f64,
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost first
        other.priority.total_cmp(&self.priority)
    }
}

#[inline]
fn edge_key(a: Index, b: Index) -> (Index, Index) {
    (a.min(b), a.max(b))
}

// ============================================================
// Edge Collapse Simplifier
// ============================================================

/// Edge collapse mesh simplifier using incidence lists and QEM.
///
/// Collapses are ordered by quadric cost. Edges touching a border vertex
/// either get `boundary_weight` added to their priority or, with
/// `preserve_boundary`, are never collapsed. The reported error is the square
/// root of the largest quadric cost of any applied collapse.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCollapseSimplifier {
    /// Stop when the minimum collapse cost exceeds this threshold
    pub error_threshold: Option<f64>,
    /// Never collapse edges touching a border vertex
    pub preserve_boundary: bool,
    /// Extra penalty weight applied to boundary edge costs
    pub boundary_weight: f64,
}

impl Default for EdgeCollapseSimplifier {
    fn default() -> Self {
        Self {
            error_threshold: None,
            preserve_boundary: false,
            boundary_weight: 100.0,
        }
    }
}

impl EdgeCollapseSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(
        error_threshold: Option<f64>,
        preserve_boundary: bool,
        boundary_weight: f64,
    ) -> Self {
        Self {
            error_threshold,
            preserve_boundary,
            boundary_weight,
        }
    }

    /// Queue priority of edge `a`-`b`, `None` if it may not collapse
    fn edge_priority(&self, mesh: &CollapseMesh, a: Index, b: Index) -> Option<EdgeCost> {
        let (_, _, _, cost) = mesh.plan_collapse(a, b)?;
        let on_border = mesh.is_border_vertex(a) || mesh.is_border_vertex(b);
        if on_border && self.preserve_boundary {
            return None;
        }
        let penalty = if on_border { self.boundary_weight } else { 0.0 };
        Some(EdgeCost {
            priority: cost + penalty,
        })
    }

    fn requeue_around(
        &self,
        mesh: &CollapseMesh,
        v: Index,
        queue: &mut PriorityQueue<(Index, Index), EdgeCost>,
    ) {
        for w in mesh.neighbors(v) {
            let key = edge_key(v, w);
            match self.edge_priority(mesh, v, w) {
                Some(cost) => {
                    queue.push(key, cost);
                }
                None => {
                    queue.remove(&key);
                }
            }
        }
    }

    /// Build the initial priority queue of edge collapse candidates.
    fn build_queue(&self, mesh: &CollapseMesh) -> PriorityQueue<(Index, Index), EdgeCost> {
        let mut queue = PriorityQueue::new();
        for (f, face) in mesh.faces.iter().enumerate() {
            if !mesh.face_alive[f] {
                continue;
            }
            for c in 0..3 {
                let key = edge_key(face[c], face[(c + 1) % 3]);
                if key.0 == key.1 || queue.get(&key).is_some() {
                    continue;
                }
                if let Some(cost) = self.edge_priority(mesh, key.0, key.1) {
                    queue.push(key, cost);
                }
            }
        }
        queue
    }

    /// Collapses edges until `target` faces remain or nothing collapses.
    /// Returns the largest applied quadric cost.
    fn run(&self, mesh: &mut CollapseMesh, target: usize) -> f64 {
        let mut queue = self.build_queue(mesh);
        let mut max_cost = 0.0f64;
        let mut collapse_count = 0usize;

        while mesh.alive_faces > target {
            let Some(((a, b), edge_cost)) = queue.pop() else {
                break;
            };

            // Check error threshold
            if let Some(threshold) = self.error_threshold {
                if edge_cost.priority > threshold {
                    break;
                }
            }

            // Validate: both vertices still alive and still neighbors
            if mesh.collapsed_into[a as usize] != NONE || mesh.collapsed_into[b as usize] != NONE {
                continue;
            }
            if !mesh.check_link_condition(a, b) {
                continue;
            }
            let Some((from, to, p, cost)) = mesh.plan_collapse(a, b) else {
                continue;
            };
            if mesh.alive_faces <= mesh.edge_faces(a, b) {
                continue;
            }
            if mesh.flips_faces(from, to, &p) {
                continue;
            }

            mesh.collapse(from, to, p);
            max_cost = max_cost.max(cost);
            collapse_count += 1;
            self.requeue_around(mesh, to, &mut queue);
            for w in mesh.neighbors(to) {
                self.requeue_around(mesh, w, &mut queue);
            }
        }

        trace!(
            collapses = collapse_count,
            faces = mesh.alive_faces,
            target,
            "edge collapse finished"
        );
        max_cost
    }
}

impl Simplifier for EdgeCollapseSimplifier {
    fn simplify(
        &self,
        mesh: &mut SubMesh,
        target_triangle_count: usize,
        locked: &[bool],
    ) -> Result<f32> {
        if mesh.is_empty() {
            return Err(Error::Collaborator("cannot simplify an empty submesh".to_string()));
        }
        if locked.len() != mesh.positions.len() {
            return Err(Error::Collaborator(format!(
                "{} lock flags for {} positions",
                locked.len(),
                mesh.positions.len()
            )));
        }
        mesh.validate()?;

        let target = target_triangle_count.max(1);
        if mesh.triangle_count() <= target {
            return Ok(0.0);
        }

        let mut work = CollapseMesh::new(mesh, locked);
        let max_cost = self.run(&mut work, target);

        for wedge in mesh.wedges.iter_mut() {
            wedge.p = work.resolve(wedge.p);
        }
        let mut triangles = Vec::with_capacity(work.alive_faces);
        let mut material_ids = Vec::new();
        for (f, triangle) in mesh.triangles.iter().enumerate() {
            if work.face_alive[f] {
                triangles.push(*triangle);
                if let Some(&id) = mesh.material_ids.get(f) {
                    material_ids.push(id);
                }
            }
        }
        mesh.triangles = triangles;
        if !mesh.material_ids.is_empty() {
            mesh.material_ids = material_ids;
        }
        mesh.positions = work.positions;

        Ok(max_cost.sqrt() as f32)
    }
}
