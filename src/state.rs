//! Mutable decomposition state with incremental bookkeeping.
//!
//! The state owns the flat slot array, the partner tables, the permit
//! matrix, the coupled occurrence indices, and the running counters the
//! scheduler steers by (`achieved`, `minmuls`) together with the best
//! decomposition seen so far. Everything is allocated once at construction;
//! the per-transition operations ([`rewrite`](SchemeState::rewrite),
//! [`fill`](SchemeState::fill), [`drop_term`](SchemeState::drop_term)) only
//! touch preallocated storage.

use crate::index::CollisionIndex;
use crate::symmetry::{Partners, Permit, Symm};

/// The complete mutable state of one flip-graph walk.
pub struct SchemeState {
    /// Component bitmasks, one per slot; zero marks a vacant slot.
    masks: Vec<u64>,
    partners: Partners,
    permit: Permit,
    index: CollisionIndex,
    /// Number of nonzero slots.
    achieved: usize,
    /// Lowest `achieved` seen so far.
    minmuls: usize,
    /// Snapshot of the slot array when `minmuls` was last matched.
    best: Vec<u64>,
}

impl SchemeState {
    /// Builds the state for `masks` under the given symmetry.
    ///
    /// Indexes every nonzero slot and snapshots the input as the initial
    /// best decomposition.
    ///
    /// # Panics
    /// Panics if the slot count is not a multiple of the orbit size.
    pub fn new(masks: Vec<u64>, symm: Symm) -> Self {
        let slots = masks.len();
        assert_eq!(
            slots % symm.group(),
            0,
            "slot count must be a multiple of the symmetry group"
        );
        let partners = Partners::new(slots);
        let permit = Permit::new(slots, symm.group());
        let mut index = CollisionIndex::new(slots);
        let mut achieved = 0;
        for (r, &m) in masks.iter().enumerate() {
            if m > 0 {
                index.insert(r, m);
                achieved += 1;
            }
        }
        let best = masks.clone();
        Self {
            masks,
            partners,
            permit,
            index,
            achieved,
            minmuls: achieved,
            best,
        }
    }

    /// Total number of slots.
    #[inline(always)]
    pub fn slots(&self) -> usize {
        self.masks.len()
    }

    /// The bitmask at slot `r`.
    #[inline(always)]
    pub fn mask(&self, r: usize) -> u64 {
        self.masks[r]
    }

    /// The full slot array.
    #[inline(always)]
    pub fn masks(&self) -> &[u64] {
        &self.masks
    }

    /// Second-component partner slot of `p`.
    #[inline(always)]
    pub fn e(&self, p: usize) -> usize {
        self.partners.e(p)
    }

    /// Third-component partner slot of `p`.
    #[inline(always)]
    pub fn f(&self, p: usize) -> usize {
        self.partners.f(p)
    }

    /// Whether slots `p` and `q` lie in different symmetry groups.
    #[inline(always)]
    pub fn allowed(&self, p: usize, q: usize) -> bool {
        self.permit.allowed(p, q)
    }

    /// Number of values currently held by two or more slots.
    #[inline(always)]
    pub fn collision_count(&self) -> usize {
        self.index.collision_count()
    }

    /// The `i`-th colliding value in dense order.
    #[inline(always)]
    pub fn collision_at(&self, i: usize) -> u64 {
        self.index.collision_at(i)
    }

    /// The slot list currently holding value `v` (assumed present).
    #[inline(always)]
    pub fn slot_list(&mut self, v: u64) -> &[u32] {
        self.index.slot_list(v)
    }

    /// Replaces the value at an occupied slot, updating both indices.
    ///
    /// The new value may be zero: a freshly zeroed slot stays indexed until
    /// the cascade that inspects it removes the whole term.
    #[inline]
    pub fn rewrite(&mut self, slot: usize, new: u64) {
        self.index.remove(slot, self.masks[slot]);
        self.index.insert(slot, new);
        self.masks[slot] = new;
    }

    /// Writes a value into a vacant (zero, unindexed) slot.
    #[inline]
    pub fn fill(&mut self, slot: usize, v: u64) {
        debug_assert_eq!(self.masks[slot], 0, "fill of occupied slot");
        self.index.insert(slot, v);
        self.masks[slot] = v;
    }

    /// Removes the whole term containing slot `p` and zeroes its slots.
    ///
    /// All three slots are unindexed at their current values (one of which
    /// may itself be a transient zero written by the preceding rewrite) and
    /// `achieved` drops by 3.
    #[inline]
    pub fn drop_term(&mut self, p: usize) {
        let (ep, fp) = (self.partners.e(p), self.partners.f(p));
        self.index.remove(p, self.masks[p]);
        self.index.remove(ep, self.masks[ep]);
        self.index.remove(fp, self.masks[fp]);
        self.masks[p] = 0;
        self.masks[ep] = 0;
        self.masks[fp] = 0;
        self.achieved -= 3;
    }

    /// Current number of nonzero slots.
    #[inline(always)]
    pub fn achieved(&self) -> usize {
        self.achieved
    }

    /// Raises `achieved` after a plus transition populated `by` slots.
    #[inline(always)]
    pub fn raise_achieved(&mut self, by: usize) {
        self.achieved += by;
    }

    /// Lowest `achieved` seen so far.
    #[inline(always)]
    pub fn minmuls(&self) -> usize {
        self.minmuls
    }

    /// Records a new lowest rank.
    #[inline(always)]
    pub fn set_minmuls(&mut self, value: usize) {
        self.minmuls = value;
    }

    /// Snapshots the current slot array as the best decomposition.
    #[inline]
    pub fn snapshot_best(&mut self) {
        self.best.copy_from_slice(&self.masks);
    }

    /// The best decomposition recorded so far.
    #[inline(always)]
    pub fn best(&self) -> &[u64] {
        &self.best
    }

    /// Cross-checks the indices, the slot array and `achieved`.
    ///
    /// Test/debug harness only; never called on the release hot path.
    ///
    /// # Panics
    /// Panics if any invariant is violated.
    pub fn assert_consistent(&mut self) {
        let nonzero = self.masks.iter().filter(|&&m| m != 0).count();
        assert_eq!(self.achieved, nonzero, "achieved drifted from slot array");
        assert!(self.minmuls <= self.achieved, "minmuls above current rank");
        let best_nonzero = self.best.iter().filter(|&&m| m != 0).count();
        assert_eq!(best_nonzero, self.minmuls, "best snapshot rank drifted");
        self.index.assert_consistent(&self.masks);
    }
}

// ============================================================================
// Tests
// ============================================================================
