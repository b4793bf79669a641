//! # Cuckoo Filter
//!
//! Space-efficient approximate set membership with deletion.
//!
//! Every element maps to a 16-bit fingerprint and two candidate buckets. An
//! element is reported present when its fingerprint sits in either candidate
//! bucket, so lookups can return false positives but never false negatives.
//!
//! When both candidate buckets are full, insertion evicts a random resident
//! fingerprint into its alternate bucket, repeating up to [`MAX_KICKS`]
//! times. If no free slot turns up, the evictions are replayed in reverse and
//! the filter is left exactly as it was before the call.

mod codec;
#[cfg(test)]
mod tests;

pub use codec::MAGIC;

use crate::{
    Error, Result,
    bucket::{Bucket, ENTRIES_PER_BUCKET, Fingerprint},
    hash::{alt_index, fingerprint, hash_bytes},
};

/// Largest capacity a filter may be created with.
///
/// Bucket storage is zero-filled up front, so this bounds resident memory per
/// filter (2^22 buckets of 8 bytes, 32 MiB).
pub const MAX_CAPACITY: u64 = 1 << 24;

/// Maximum number of relocations attempted by a single insert.
pub const MAX_KICKS: usize = 500;

const MAX_BUCKETS: u64 = MAX_CAPACITY / ENTRIES_PER_BUCKET as u64;

/// A cuckoo filter over arbitrary byte strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CuckooFilter {
    buckets: Vec<Bucket>,
    count: u64,
}

impl CuckooFilter {
    /// Creates a filter able to hold roughly `capacity` elements.
    ///
    /// The bucket count is rounded up to a power of two, so the effective
    /// [`capacity`](Self::capacity) may be larger than requested. A capacity
    /// of zero yields a single bucket.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`] or the bucket table
    /// cannot be allocated. Use [`CuckooFilter::try_new`] for untrusted input.
    pub fn new(capacity: u64) -> Self {
        match Self::try_new(capacity) {
            Ok(filter) => filter,
            Err(e) => panic!("cannot create cuckoo filter: {e}"),
        }
    }

    /// Fallible counterpart of [`CuckooFilter::new`].
    ///
    /// # Errors
    ///
    /// - [`Error::CapacityTooLarge`] if `capacity > MAX_CAPACITY`.
    /// - [`Error::AllocationFailed`] if the bucket table cannot be reserved.
    pub fn try_new(capacity: u64) -> Result<Self> {
        if capacity > MAX_CAPACITY {
            return Err(Error::CapacityTooLarge {
                requested: capacity,
                max: MAX_CAPACITY,
            });
        }

        let bucket_count = capacity
            .div_ceil(ENTRIES_PER_BUCKET as u64)
            .next_power_of_two()
            .max(1);

        Ok(Self {
            buckets: allocate_buckets(bucket_count)?,
            count: 0,
        })
    }

    /// Inserts `element`.
    ///
    /// Returns `false` when no slot could be found within [`MAX_KICKS`]
    /// relocations. The filter is unchanged in that case; a larger filter is
    /// needed to raise the success rate.
    pub fn insert(&mut self, element: &[u8]) -> bool {
        let (fp, i1, i2) = self.candidates(element);

        if self.buckets[i1].insert(fp) || self.buckets[i2].insert(fp) {
            self.count += 1;
            return true;
        }

        let start = if rand::random::<bool>() { i1 } else { i2 };
        self.relocate(fp, start)
    }

    /// Returns `true` if `element` may be in the filter.
    pub fn lookup(&self, element: &[u8]) -> bool {
        let (fp, i1, i2) = self.candidates(element);
        self.buckets[i1].contains(fp) || self.buckets[i2].contains(fp)
    }

    /// Removes one occurrence of `element`. Returns `false` if it was not
    /// found.
    pub fn delete(&mut self, element: &[u8]) -> bool {
        let (fp, i1, i2) = self.candidates(element);

        if self.buckets[i1].remove(fp) || self.buckets[i2].remove(fp) {
            self.count -= 1;
            return true;
        }
        false
    }

    /// Number of elements currently stored.
    pub const fn count(&self) -> u64 {
        self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total number of slots.
    pub fn capacity(&self) -> u64 {
        self.buckets.len() as u64 * ENTRIES_PER_BUCKET as u64
    }

    /// Fraction of occupied slots, in `[0, 1]`.
    pub fn load_factor(&self) -> f64 {
        self.count as f64 / self.capacity() as f64
    }

    /// Empties the filter in place, keeping its capacity.
    pub fn reset(&mut self) {
        self.buckets.fill(Bucket::default());
        self.count = 0;
    }

    fn bucket_mask(&self) -> u64 {
        self.buckets.len() as u64 - 1
    }

    fn candidates(&self, element: &[u8]) -> (Fingerprint, usize, usize) {
        let hash = hash_bytes(element);
        let mask = self.bucket_mask();
        let fp = fingerprint(hash);
        let i1 = (hash & mask) as usize;
        let i2 = alt_index(i1, fp, mask);
        (fp, i1, i2)
    }

    fn relocate(&mut self, fp: Fingerprint, start: usize) -> bool {
        let mask = self.bucket_mask();
        let mut path = Vec::with_capacity(MAX_KICKS);
        let mut homeless = fp;
        let mut index = start;

        for _ in 0..MAX_KICKS {
            let slot = rand::random_range(0..ENTRIES_PER_BUCKET);
            homeless = self.buckets[index].replace(slot, homeless);
            path.push((index, slot));

            index = alt_index(index, homeless, mask);
            if self.buckets[index].insert(homeless) {
                self.count += 1;
                return true;
            }
        }

        // Walk the eviction chain backwards so every displaced fingerprint
        // returns to its slot and `fp` ends up homeless again.
        while let Some((index, slot)) = path.pop() {
            homeless = self.buckets[index].replace(slot, homeless);
        }
        debug_assert_eq!(homeless, fp);

        false
    }
}

fn allocate_buckets(bucket_count: u64) -> Result<Vec<Bucket>> {
    let len = usize::try_from(bucket_count).map_err(|_| Error::AllocationFailed {
        buckets: bucket_count,
    })?;

    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailed {
            buckets: bucket_count,
        })?;
    buckets.resize(len, Bucket::default());
    Ok(buckets)
}
