//! Old-to-new index maps
//!
//! Every stage that renumbers positions, wedges or triangles produces a
//! [`Remap`]. Dropped entries map to [`NONE`], and maps chain with
//! [`Remap::compose`] so that a sequence of renumberings can be applied to
//! dependent arrays in a single pass.

use crate::mesh::{FaceAdjacency, Index, Triangle, NONE};

/// Maps each old index to its new index, or to `NONE` when the element was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    forward: Vec<Index>,
    target_len: usize,
}

impl Remap {
    /// Maps every index to itself
    pub fn identity(len: usize) -> Self {
        Self {
            forward: (0..len as Index).collect(),
            target_len: len,
        }
    }

    /// Wraps an explicit old-to-new table. The target length is one past the
    /// largest mapped index.
    pub fn from_forward(forward: Vec<Index>) -> Self {
        let target_len = forward
            .iter()
            .filter(|&&i| i != NONE)
            .map(|&i| i as usize + 1)
            .max()
            .unwrap_or(0);
        Self { forward, target_len }
    }

    /// Builds the map from a new ordering where `order[new] = old`.
    /// Old indices missing from `order` are dropped.
    pub fn from_new_order(order: &[Index], old_len: usize) -> Self {
        let mut forward = vec![NONE; old_len];
        for (new, &old) in order.iter().enumerate() {
            forward[old as usize] = new as Index;
        }
        Self {
            forward,
            target_len: order.len(),
        }
    }

    /// Keeps the flagged entries in their relative order and drops the rest.
    pub fn from_kept(kept: &[bool]) -> Self {
        let mut next = 0;
        let forward = kept
            .iter()
            .map(|&keep| {
                if keep {
                    next += 1;
                    next - 1
                } else {
                    NONE
                }
            })
            .collect();
        Self {
            forward,
            target_len: next as usize,
        }
    }

    /// Number of old indices
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Number of new indices
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    pub fn get(&self, old: Index) -> Option<Index> {
        match self.forward.get(old as usize) {
            Some(&new) if new != NONE => Some(new),
            _ => None,
        }
    }

    /// New index of `old`; `NONE` and out-of-range inputs map to `NONE`.
    #[inline]
    pub fn apply(&self, old: Index) -> Index {
        if old == NONE {
            return NONE;
        }
        self.forward.get(old as usize).copied().unwrap_or(NONE)
    }

    /// Applies `self` first, then `next`.
    pub fn compose(&self, next: &Remap) -> Remap {
        Remap {
            forward: self.forward.iter().map(|&i| next.apply(i)).collect(),
            target_len: next.target_len,
        }
    }

    pub fn apply_to_triangle(&self, triangle: &Triangle) -> Triangle {
        Triangle {
            w: triangle.w.map(|w| self.apply(w)),
        }
    }

    pub fn apply_to_adjacency(&self, adjacency: &FaceAdjacency) -> FaceAdjacency {
        FaceAdjacency {
            opp: adjacency.opp.map(|o| self.apply(o)),
        }
    }

    /// Rewrites every index in place
    pub fn apply_in_place(&self, indices: &mut [Index]) {
        for i in indices {
            *i = self.apply(*i);
        }
    }

    /// Builds the renumbered array: entry `new` receives `data[old]`.
    /// When several old entries share a new index, the first one wins.
    pub fn gather<T: Copy>(&self, data: &[T]) -> Vec<T> {
        let mut out: Vec<Option<T>> = vec![None; self.target_len];
        for (old, &new) in self.forward.iter().enumerate() {
            if new == NONE {
                continue;
            }
            let slot = &mut out[new as usize];
            if slot.is_none() {
                *slot = data.get(old).copied();
            }
        }
        out.into_iter().flatten().collect()
    }

    /// New-to-old table; for many-to-one maps the first old index is kept.
    pub fn inverse(&self) -> Vec<Index> {
        let mut inverse = vec![NONE; self.target_len];
        for (old, &new) in self.forward.iter().enumerate() {
            if new != NONE && inverse[new as usize] == NONE {
                inverse[new as usize] = old as Index;
            }
        }
        inverse
    }

    /// True when every old index maps to a distinct new index and nothing is dropped.
    pub fn is_permutation(&self) -> bool {
        if self.forward.len() != self.target_len {
            return false;
        }
        let mut seen = vec![false; self.target_len];
        for &new in &self.forward {
            if new == NONE || seen[new as usize] {
                return false;
            }
            seen[new as usize] = true;
        }
        true
    }

    pub fn as_slice(&self) -> &[Index] {
        &self.forward
    }
}
