//! Binary snapshot format.
//!
//! ```text
//! +-------+------------------+-----------------+---------------------------+
//! | magic | bucket count u64 | element cnt u64 | fingerprints u16 * 4 * n  |
//! +-------+------------------+-----------------+---------------------------+
//! ```
//!
//! All integers are little-endian. Empty slots are encoded as zero.

use super::{CuckooFilter, MAX_BUCKETS, allocate_buckets};
use crate::{
    Error, Result,
    bucket::{Bucket, ENTRIES_PER_BUCKET, Fingerprint},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Leading bytes of every encoded filter.
pub const MAGIC: &[u8; 4] = b"CKF1";

const HEADER_LEN: usize = MAGIC.len() + 2 * size_of::<u64>();
const BUCKET_LEN: usize = ENTRIES_PER_BUCKET * size_of::<Fingerprint>();

impl CuckooFilter {
    /// Size in bytes of [`CuckooFilter::encode`]'s output.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.buckets.len() * BUCKET_LEN
    }

    /// Serializes the filter into its compact binary form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(MAGIC);
        buf.put_u64_le(self.buckets.len() as u64);
        buf.put_u64_le(self.count);
        for bucket in &self.buckets {
            for fp in bucket.slots() {
                buf.put_u16_le(*fp);
            }
        }
        buf.freeze()
    }

    /// Rebuilds a filter from bytes produced by [`CuckooFilter::encode`].
    ///
    /// # Errors
    ///
    /// Fails if the header is unknown, the bucket count is invalid, the
    /// buffer length disagrees with the header, or the stored element count
    /// does not match the occupied slots.
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(Error::LengthMismatch {
                expected: HEADER_LEN,
                found: src.len(),
            });
        }
        if !src.starts_with(MAGIC) {
            return Err(Error::BadMagic);
        }
        src.advance(MAGIC.len());

        let bucket_count = src.get_u64_le();
        let stored = src.get_u64_le();

        if bucket_count == 0 || !bucket_count.is_power_of_two() || bucket_count > MAX_BUCKETS {
            return Err(Error::BadBucketCount(bucket_count));
        }

        // Bounded by MAX_BUCKETS, so this cannot overflow.
        let body_len = bucket_count as usize * BUCKET_LEN;
        if src.len() != body_len {
            return Err(Error::LengthMismatch {
                expected: HEADER_LEN + body_len,
                found: HEADER_LEN + src.len(),
            });
        }

        let mut buckets = allocate_buckets(bucket_count)?;
        let mut occupied = 0_u64;
        for bucket in &mut buckets {
            let mut slots = [0; ENTRIES_PER_BUCKET];
            for slot in &mut slots {
                *slot = src.get_u16_le();
            }
            *bucket = Bucket::from_slots(slots);
            occupied += bucket.occupied() as u64;
        }

        if occupied != stored {
            return Err(Error::CountMismatch { stored, occupied });
        }

        Ok(Self {
            buckets,
            count: stored,
        })
    }
}
