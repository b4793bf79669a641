/// A result type defaulting to the filter [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors a [`crate::CuckooFilter`] can produce.
///
/// Membership operations themselves are infallible and report outcomes as
/// `bool`. Errors only arise when constructing a filter or when decoding a
/// snapshot produced by [`crate::CuckooFilter::encode`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested capacity is above [`crate::MAX_CAPACITY`].
    #[error("capacity {requested} exceeds the maximum of {max}")]
    CapacityTooLarge { requested: u64, max: u64 },

    /// The bucket table could not be allocated.
    #[error("failed to allocate {buckets} buckets")]
    AllocationFailed { buckets: u64 },

    /// The encoded bytes do not start with the expected header.
    #[error("unrecognized snapshot header")]
    BadMagic,

    /// The encoded bucket count is zero, not a power of two, or too large.
    #[error("invalid bucket count {0}")]
    BadBucketCount(u64),

    /// The encoded buffer is shorter or longer than its header describes.
    #[error("snapshot length mismatch: expected {expected} bytes, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// The stored element count disagrees with the occupied slots.
    #[error("element count {stored} does not match {occupied} occupied slots")]
    CountMismatch { stored: u64, occupied: u64 },
}
