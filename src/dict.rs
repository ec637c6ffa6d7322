//! Bucketed dictionary specialized for the flip-graph hot loop.
//!
//! The engine looks up component bitmasks hundreds of millions of times per
//! run, almost always in tight delete-then-insert pairs on the same key. A
//! general-purpose hash map pays for rehashing and branch-heavy probing on
//! every call; this table instead uses a fixed bucket layout and a
//! *last-bucket cache* so a membership probe followed by an insertion (or a
//! paired lookup in a sibling table) hashes exactly once.
//!
//! Layout: a key `k` maps to bucket base `(k mod 65213) << 4`. Each bucket
//! holds up to [`BUCKET_WIDTH`] entries at consecutive offsets, with the
//! live count stored per base. The tables the engine builds hold at most a
//! few hundred distinct keys, so genuine bucket overflow does not occur in
//! practice and collisions between distinct keys are rare enough that a
//! short top-down scan wins over anything cleverer.

/// Number of buckets in the table.
const BUCKETS: usize = 65536;

/// Maximum entries per bucket.
const BUCKET_WIDTH: usize = 16;

/// Total entry capacity (`BUCKETS * BUCKET_WIDTH`).
const TABLE_SIZE: usize = BUCKETS * BUCKET_WIDTH;

/// Modulus for the bucket hash. Prime, close below `BUCKETS`.
const HASH_MOD: u64 = 65213;

/// A fixed-capacity bucketed map from `u64` bitmask keys to `u32` values.
///
/// All operations run in O(bucket occupancy), which is O(1) for the key
/// distributions the engine produces. Mutating lookups remember the bucket
/// they touched; the `*_cached` variants reuse that bucket without
/// rehashing, including across two coupled tables via
/// [`set_cached_bucket`](MaskDict::set_cached_bucket).
///
/// Removal and value replacement assume the key is present, and insertion
/// assumes it is absent; callers own those contracts (they are checked with
/// `debug_assert!` only).
pub struct MaskDict {
    /// Bucket base of the most recent hashing operation.
    cached: usize,
    /// Live entry count, indexed by bucket base.
    count: Vec<u32>,
    /// Entry keys.
    keys: Vec<u64>,
    /// Entry values.
    values: Vec<u32>,
}

impl Default for MaskDict {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskDict {
    /// Creates an empty table with all buckets allocated up front.
    pub fn new() -> Self {
        Self {
            cached: 0,
            count: vec![0; TABLE_SIZE],
            keys: vec![0; TABLE_SIZE],
            values: vec![0; TABLE_SIZE],
        }
    }

    /// Bucket base for key `k`.
    #[inline(always)]
    pub fn bucket(k: u64) -> usize {
        ((k % HASH_MOD) as usize) << 4
    }

    /// Returns the bucket base remembered by the last hashing operation.
    #[inline(always)]
    pub fn cached_bucket(&self) -> usize {
        self.cached
    }

    /// Overrides the remembered bucket base.
    ///
    /// Used to transplant a bucket location computed by a sibling table for
    /// the same key, so the pair of tables hashes once per key event.
    #[inline(always)]
    pub fn set_cached_bucket(&mut self, bucket: usize) {
        debug_assert!(bucket < TABLE_SIZE && bucket & (BUCKET_WIDTH - 1) == 0);
        self.cached = bucket;
    }

    /// Returns whether `k` is present, remembering its bucket.
    #[inline]
    pub fn contains(&mut self, k: u64) -> bool {
        self.cached = Self::bucket(k);
        let h = self.cached;
        let c = self.count[h] as usize;
        if c == 0 {
            false
        } else if c == 1 {
            self.keys[h] == k
        } else {
            self.keys[h..h + c].iter().rev().any(|&x| x == k)
        }
    }

    /// Inserts `k -> v`, assuming `k` is absent.
    #[inline]
    pub fn add(&mut self, k: u64, v: u32) {
        self.cached = Self::bucket(k);
        self.add_cached(k, v);
    }

    /// Inserts `k -> v` into the remembered bucket, assuming `k` is absent.
    #[inline]
    pub fn add_cached(&mut self, k: u64, v: u32) {
        let h = self.cached;
        debug_assert_eq!(h, Self::bucket(k));
        debug_assert!((self.count[h] as usize) < BUCKET_WIDTH, "bucket overflow");
        let b = h + self.count[h] as usize;
        self.keys[b] = k;
        self.values[b] = v;
        self.count[h] += 1;
    }

    /// Removes `k`, assuming it is present.
    #[inline]
    pub fn remove(&mut self, k: u64) {
        self.cached = Self::bucket(k);
        self.remove_cached(k);
    }

    /// Removes `k` from the remembered bucket, assuming it is present.
    ///
    /// Entries above the doomed one shift down a slot, so relative order of
    /// the survivors is preserved.
    #[inline]
    pub fn remove_cached(&mut self, k: u64) {
        let h = self.cached;
        debug_assert_eq!(h, Self::bucket(k));
        let c = self.count[h] as usize;
        debug_assert!(c > 0, "remove on empty bucket");
        if c == 1 {
            debug_assert_eq!(self.keys[h], k);
            self.count[h] = 0;
        } else {
            let mut i = h + c - 1;
            let mut x = self.keys[i];
            let mut v = self.values[i];
            while x != k {
                debug_assert!(i > h, "key not present in bucket");
                i -= 1;
                let y = x;
                x = self.keys[i];
                self.keys[i] = y;
                let w = v;
                v = self.values[i];
                self.values[i] = w;
            }
            self.count[h] -= 1;
        }
    }

    /// Replaces the value stored for `k`, assuming it is present.
    #[inline]
    pub fn replace(&mut self, k: u64, v: u32) {
        self.cached = Self::bucket(k);
        let h = self.cached;
        let c = self.count[h] as usize;
        debug_assert!(c > 0, "replace on empty bucket");
        if c == 1 {
            debug_assert_eq!(self.keys[h], k);
            self.values[h] = v;
        } else {
            let mut i = h + c - 1;
            while self.keys[i] != k {
                debug_assert!(i > h, "key not present in bucket");
                i -= 1;
            }
            self.values[i] = v;
        }
    }

    /// Returns the value stored for `k`, assuming it is present; remembers
    /// the bucket.
    #[inline]
    pub fn get(&mut self, k: u64) -> u32 {
        self.cached = Self::bucket(k);
        self.get_cached(k)
    }

    /// Returns the value stored for `k` from the remembered bucket,
    /// assuming it is present.
    #[inline]
    pub fn get_cached(&self, k: u64) -> u32 {
        let h = self.cached;
        debug_assert_eq!(h, Self::bucket(k));
        let c = self.count[h] as usize;
        debug_assert!(c > 0, "get on empty bucket");
        if c == 1 {
            debug_assert_eq!(self.keys[h], k);
            self.values[h]
        } else {
            let mut i = h + c - 1;
            while self.keys[i] != k {
                debug_assert!(i > h, "key not present in bucket");
                i -= 1;
            }
            self.values[i]
        }
    }

    /// Returns the total number of stored entries.
    ///
    /// Walks every bucket base; intended for diagnostics and tests, not the
    /// hot loop.
    pub fn len(&self) -> usize {
        (0..BUCKETS)
            .map(|i| self.count[i << 4] as usize)
            .sum()
    }

    /// Returns whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
