use crate::bucket::Fingerprint;
use core::hash::Hasher;
use siphasher::sip::SipHasher13;

// Keys are fixed: bucket positions are persisted in snapshots and must be
// identical in every process that decodes them.
const KEY0: u64 = 0x6375_636b_6f6f_2d66;
const KEY1: u64 = 0x696c_7465_722d_7631;

pub(crate) fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(KEY0, KEY1);
    hasher.write(bytes);
    hasher.finish()
}

/// Derives a non-zero fingerprint from the top 16 bits of `hash`.
pub(crate) const fn fingerprint(hash: u64) -> Fingerprint {
    let fp = (hash >> 48) as Fingerprint;
    if fp == 0 { 1 } else { fp }
}

/// Partial-key cuckoo hashing: the alternate bucket depends only on the
/// current bucket and the fingerprint, so it can be computed during
/// relocation without the original element. `mask` must be `2^n - 1`, which
/// makes the mapping an involution.
pub(crate) fn alt_index(index: usize, fp: Fingerprint, mask: u64) -> usize {
    ((index as u64 ^ hash_bytes(&fp.to_le_bytes())) & mask) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_bytes(b"jack"), hash_bytes(b"jack"));
        assert_ne!(hash_bytes(b"jack"), hash_bytes(b"mary"));
    }

    #[test]
    fn fingerprint_is_never_empty() {
        assert_eq!(fingerprint(0), 1);
        assert_eq!(fingerprint(u64::MAX), u16::MAX);
    }

    #[test]
    fn alt_index_is_an_involution() {
        let mask = 1023;
        for index in 0..1024 {
            for fp in [1, 77, 4096, u16::MAX] {
                let alt = alt_index(index, fp, mask);
                assert!(alt <= mask as usize);
                assert_eq!(alt_index(alt, fp, mask), index);
            }
        }
    }
}
