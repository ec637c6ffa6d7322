//! Coupled occurrence indices over the term-slot array.
//!
//! Two views of "which component value sits where" are kept in lockstep:
//!
//! - The **uniqueness index** maps each distinct nonzero bitmask to the list
//!   of slots currently holding it. Slot lists live in a preallocated slab
//!   (one fixed-width bucket per possible distinct value), recycled through
//!   a free list, so list growth never allocates.
//! - The **collision index** tracks exactly the values whose slot list has
//!   length >= 2, mirrored into a dense vector for O(1) uniform sampling.
//!   Membership changes use swap-with-last so both directions stay O(1).
//!
//! Every mutation goes through [`CollisionIndex::insert`] /
//! [`CollisionIndex::remove`], which keep both views and the dense vector
//! coherent. When a value is promoted into (or demoted out of) the
//! collision index, the bucket location computed by the uniqueness lookup
//! is transplanted into the sibling table, so the pair costs one hash.
//!
//! The engine calls these two operations once per rewritten slot; that is
//! the entire incremental cost of a flip. Consistency of the coupled structures
//! is checked by [`CollisionIndex::assert_consistent`] in tests and debug
//! builds; nothing here validates arguments at run time.

use crate::dict::MaskDict;

/// Coupled uniqueness/collision indices with O(1) collision sampling.
pub struct CollisionIndex {
    /// Value -> slab bucket base holding its slot list.
    uniques: MaskDict,
    /// Value -> position in `multi_list`, for values at >= 2 slots.
    multi: MaskDict,
    /// Dense vector of currently colliding values, for uniform sampling.
    multi_list: Vec<u64>,
    /// Slot-list slab: `slab[b]` is the list length, `slab[b+1..=b+len]`
    /// the slot indices. Bucket `i` starts at `i * (slots + 1)`.
    slab: Vec<u32>,
    /// Free slab bucket bases.
    avail: Vec<u32>,
    /// Total number of term slots.
    slots: usize,
}

impl CollisionIndex {
    /// Creates an empty index sized for `slots` term slots.
    ///
    /// At most `slots` distinct values can be present at once, so the slab
    /// holds `slots` buckets of `slots + 1` entries each.
    pub fn new(slots: usize) -> Self {
        let stride = slots + 1;
        let avail = (0..slots).map(|i| (i * stride) as u32).collect();
        Self {
            uniques: MaskDict::new(),
            multi: MaskDict::new(),
            multi_list: Vec::with_capacity(slots),
            slab: vec![0; slots * stride],
            avail,
            slots,
        }
    }

    /// Returns the number of term slots this index covers.
    #[inline(always)]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Records that slot `r` now holds value `v`.
    ///
    /// Promotes `v` into the collision index when its occupancy reaches 2.
    #[inline]
    pub fn insert(&mut self, r: usize, v: u64) {
        if self.uniques.contains(v) {
            let b = self.uniques.get_cached(v) as usize;
            let l = self.slab[b] as usize;
            if l == 1 {
                self.multi.set_cached_bucket(self.uniques.cached_bucket());
                self.multi.add_cached(v, self.multi_list.len() as u32);
                self.multi_list.push(v);
            }
            self.slab[b + l + 1] = r as u32;
            self.slab[b] = (l + 1) as u32;
        } else {
            let b = self.avail.pop().expect("slab bucket pool exhausted") as usize;
            self.uniques.add_cached(v, b as u32);
            self.slab[b + 1] = r as u32;
            self.slab[b] = 1;
        }
    }

    /// Records that slot `r` no longer holds value `v`.
    ///
    /// Demotes `v` from the collision index when its occupancy drops to 1,
    /// filling the vacated dense-vector position by swap-with-last. Assumes
    /// `(r, v)` is currently recorded.
    #[inline]
    pub fn remove(&mut self, r: usize, v: u64) {
        let b = self.uniques.get(v) as usize;
        let l = self.slab[b] as usize;
        if l == 2 {
            self.multi.set_cached_bucket(self.uniques.cached_bucket());
            let pos = self.multi.get_cached(v) as usize;
            let last = self.multi_list[self.multi_list.len() - 1];
            self.multi.replace(last, pos as u32);
            self.multi_list[pos] = last;
            self.multi_list.pop();
            self.multi.set_cached_bucket(self.uniques.cached_bucket());
            self.multi.remove_cached(v);
        }
        if l == 1 {
            self.avail.push(b as u32);
            self.uniques.remove_cached(v);
        } else {
            // Shift entries above `r` down a slot; the list keeps its order.
            let mut i = b + l;
            let mut x = self.slab[i];
            while x != r as u32 {
                debug_assert!(i > b + 1, "slot not present in list");
                i -= 1;
                let y = x;
                x = self.slab[i];
                self.slab[i] = y;
            }
            self.slab[b] = (l - 1) as u32;
        }
    }

    /// Returns the slot list currently holding value `v`.
    ///
    /// Assumes `v` is present.
    #[inline]
    pub fn slot_list(&mut self, v: u64) -> &[u32] {
        let b = self.uniques.get(v) as usize;
        let l = self.slab[b] as usize;
        &self.slab[b + 1..=b + l]
    }

    /// Number of values currently held by two or more slots.
    #[inline(always)]
    pub fn collision_count(&self) -> usize {
        self.multi_list.len()
    }

    /// The `i`-th colliding value in dense order.
    ///
    /// Combined with [`collision_count`](Self::collision_count) this gives
    /// O(1) uniform sampling of a colliding value.
    #[inline(always)]
    pub fn collision_at(&self, i: usize) -> u64 {
        self.multi_list[i]
    }

    /// Checks every coupling invariant against the slot array `masks`.
    ///
    /// Intended for tests and debug harnesses; O(slots^2) and never called
    /// on the release hot path.
    ///
    /// # Panics
    /// Panics if any invariant is violated.
    pub fn assert_consistent(&mut self, masks: &[u64]) {
        assert_eq!(masks.len(), self.slots);

        // Each nonzero slot appears exactly once in its value's slot list;
        // zero slots appear nowhere. (Zero can occur as a transient key, so
        // it is treated like any other value here.)
        let mut seen: Vec<u64> = Vec::new();
        for (r, &v) in masks.iter().enumerate() {
            if v == 0 {
                continue;
            }
            assert!(self.uniques.contains(v), "value {v:#x} missing for slot {r}");
            let hits = self
                .slot_list(v)
                .iter()
                .filter(|&&s| s as usize == r)
                .count();
            assert_eq!(hits, 1, "slot {r} recorded {hits} times for {v:#x}");
            if !seen.contains(&v) {
                seen.push(v);
            }
        }

        // No stale keys, and list lengths match the slot array.
        assert_eq!(self.uniques.len(), seen.len(), "stale keys in uniqueness index");
        for &v in &seen {
            let expected = masks.iter().filter(|&&m| m == v).count();
            let l = self.slot_list(v).len();
            assert_eq!(l, expected, "bad list length for {v:#x}");

            // Collision membership tracks list length >= 2, and each
            // member's stored position matches the dense vector.
            let in_multi = self.multi.contains(v);
            assert_eq!(in_multi, l >= 2, "collision membership wrong for {v:#x}");
            if in_multi {
                let pos = self.multi.get_cached(v) as usize;
                assert_eq!(self.multi_list[pos], v, "dense position wrong for {v:#x}");
            }
        }
        assert_eq!(
            self.multi.len(),
            self.multi_list.len(),
            "collision index and dense vector disagree"
        );

        // Free list accounts for every unused slab bucket.
        assert_eq!(self.avail.len(), self.slots - seen.len());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use std::collections::BTreeMap;

    /// Applies `index` operations mirrored against a naive reference model.
    struct Mirror {
        index: CollisionIndex,
        masks: Vec<u64>,
        model: BTreeMap<u64, Vec<usize>>,
    }

    impl Mirror {
        fn new(slots: usize) -> Self {
            Self {
                index: CollisionIndex::new(slots),
                masks: vec![0; slots],
                model: BTreeMap::new(),
            }
        }

        fn set(&mut self, r: usize, v: u64) {
            let old = self.masks[r];
            if old != 0 {
                self.index.remove(r, old);
                let list = self.model.get_mut(&old).unwrap();
                list.retain(|&s| s != r);
                if list.is_empty() {
                    self.model.remove(&old);
                }
            }
            if v != 0 {
                self.index.insert(r, v);
                self.model.entry(v).or_default().push(r);
            }
            self.masks[r] = v;
        }

        fn check(&mut self) {
            self.index.assert_consistent(&self.masks);
            let expected: Vec<u64> = self
                .model
                .iter()
                .filter(|(_, l)| l.len() >= 2)
                .map(|(&v, _)| v)
                .collect();
            assert_eq!(self.index.collision_count(), expected.len());
            for &v in &expected {
                let mut found = false;
                for i in 0..self.index.collision_count() {
                    if self.index.collision_at(i) == v {
                        found = true;
                    }
                }
                assert!(found, "colliding value {v:#x} missing from dense vector");
            }
        }
    }

    #[test]
    fn promote_and_demote_around_two_occupants() {
        let mut m = Mirror::new(6);
        m.set(0, 5);
        m.check();
        assert_eq!(m.index.collision_count(), 0);

        m.set(3, 5);
        m.check();
        assert_eq!(m.index.collision_count(), 1);
        assert_eq!(m.index.collision_at(0), 5);

        m.set(5, 5);
        m.check();
        assert_eq!(m.index.collision_count(), 1);
        assert_eq!(m.index.slot_list(5), &[0, 3, 5]);

        m.set(3, 0);
        m.check();
        assert_eq!(m.index.slot_list(5), &[0, 5]);

        m.set(5, 0);
        m.check();
        assert_eq!(m.index.collision_count(), 0);

        m.set(0, 0);
        m.check();
        assert_eq!(m.index.collision_count(), 0);
    }

    #[test]
    fn dense_vector_swaps_with_last_on_demotion() {
        let mut m = Mirror::new(8);
        // Three colliding values: 7, 9, 11.
        for (i, v) in [(0, 7), (1, 7), (2, 9), (3, 9), (4, 11), (5, 11)] {
            m.set(i, v);
        }
        m.check();
        assert_eq!(m.index.collision_count(), 3);

        // Demote the first-promoted value; the last colliding value should
        // take over its dense position.
        m.set(0, 0);
        m.check();
        assert_eq!(m.index.collision_count(), 2);
        assert_eq!(m.index.collision_at(0), 11);
        assert_eq!(m.index.collision_at(1), 9);
    }

    #[test]
    fn middle_slot_removal_shifts_survivors() {
        let mut idx = CollisionIndex::new(9);
        for r in [2, 4, 7] {
            idx.insert(r, 42);
        }
        assert_eq!(idx.slot_list(42), &[2, 4, 7]);
        idx.remove(4, 42);
        assert_eq!(idx.slot_list(42), &[2, 7]);
        idx.remove(2, 42);
        assert_eq!(idx.slot_list(42), &[7]);
    }

    #[test]
    fn zero_value_is_an_ordinary_transient_key() {
        // The engine inserts a freshly-written zero before its cascade
        // deletes it again; both directions must work.
        let mut idx = CollisionIndex::new(4);
        idx.insert(1, 0);
        idx.insert(2, 0);
        assert_eq!(idx.collision_count(), 1);
        assert_eq!(idx.collision_at(0), 0);
        idx.remove(1, 0);
        idx.remove(2, 0);
        assert_eq!(idx.collision_count(), 0);
    }

    #[test]
    fn matches_reference_model_under_random_churn() {
        const SLOTS: usize = 30;
        let mut rng = XorShiftRng::seed_from_u64(0x1DE);
        let mut m = Mirror::new(SLOTS);

        // Small value universe so occupancies cross the 1 <-> 2 boundary
        // constantly, which is where the coupling can go wrong.
        let values: [u64; 7] = [3, 5, 6, 9, 10, 12, 17];

        for step in 0..30_000 {
            let r = rng.random_range(0..SLOTS);
            let v = if rng.random_bool(0.25) {
                0
            } else {
                values[rng.random_range(0..values.len())]
            };
            m.set(r, v);
            if step % 256 == 0 {
                m.check();
            }
        }
        m.check();
    }

    #[test]
    fn slab_buckets_recycle() {
        let mut idx = CollisionIndex::new(3);
        // Fill all three buckets, drain them, fill again with new values.
        for round in 0..5u64 {
            for r in 0..3 {
                idx.insert(r, 100 + round * 10 + r as u64);
            }
            for r in 0..3 {
                idx.remove(r, 100 + round * 10 + r as u64);
            }
        }
        idx.assert_consistent(&[0, 0, 0]);
    }
}
