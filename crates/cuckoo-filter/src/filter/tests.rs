use crate::{CuckooFilter, ENTRIES_PER_BUCKET, Error, MAGIC, MAX_CAPACITY};

fn element(i: u32) -> Vec<u8> {
    format!("element-{i}").into_bytes()
}

/// Inserts until the filter rejects an element, returning everything that
/// was accepted.
fn fill_until_rejected(filter: &mut CuckooFilter) -> Vec<Vec<u8>> {
    let mut accepted = Vec::new();
    for i in 0.. {
        let e = element(i);
        if !filter.insert(&e) {
            break;
        }
        accepted.push(e);
    }
    accepted
}

#[test]
fn insert_then_lookup() {
    let mut filter = CuckooFilter::new(100);

    assert!(filter.insert(b"jack"));
    assert!(filter.lookup(b"jack"));
    assert!(!filter.lookup(b"mary"));
    assert_eq!(filter.count(), 1);
}

#[test]
fn delete_removes_element() {
    let mut filter = CuckooFilter::new(100);
    filter.insert(b"jack");

    assert!(filter.delete(b"jack"));
    assert!(!filter.lookup(b"jack"));
    assert!(!filter.delete(b"jack"));
    assert_eq!(filter.count(), 0);
}

#[test]
fn duplicates_are_counted_separately() {
    let mut filter = CuckooFilter::new(100);
    assert!(filter.insert(b"jack"));
    assert!(filter.insert(b"jack"));
    assert_eq!(filter.count(), 2);

    assert!(filter.delete(b"jack"));
    assert!(filter.lookup(b"jack"));
    assert_eq!(filter.count(), 1);
}

#[test]
fn empty_element_is_valid() {
    let mut filter = CuckooFilter::new(10);
    assert!(filter.insert(b""));
    assert!(filter.lookup(b""));
    assert!(filter.delete(b""));
}

#[test]
fn capacity_rounds_up_to_power_of_two_buckets() {
    assert_eq!(CuckooFilter::new(0).capacity(), ENTRIES_PER_BUCKET as u64);
    assert_eq!(CuckooFilter::new(1).capacity(), 4);
    assert_eq!(CuckooFilter::new(100).capacity(), 128);
    assert_eq!(CuckooFilter::new(1024).capacity(), 1024);
}

#[test]
fn capacity_above_maximum_is_rejected() {
    assert_eq!(
        CuckooFilter::try_new(MAX_CAPACITY + 1),
        Err(Error::CapacityTooLarge {
            requested: MAX_CAPACITY + 1,
            max: MAX_CAPACITY,
        })
    );
    assert!(CuckooFilter::try_new(u64::MAX).is_err());
}

#[test]
fn maximum_capacity_stays_within_memory_bound() {
    let filter = CuckooFilter::try_new(MAX_CAPACITY).unwrap();
    assert_eq!(filter.capacity(), MAX_CAPACITY);
    // Two bytes per fingerprint slot.
    assert!(filter.capacity() * 2 <= 32 << 20);
    assert_eq!(filter.encode().len(), filter.encoded_len());
}

#[test]
fn reset_clears_in_place() {
    let mut filter = CuckooFilter::new(100);
    for i in 0..50 {
        filter.insert(&element(i));
    }
    let capacity = filter.capacity();

    filter.reset();

    assert!(filter.is_empty());
    assert_eq!(filter.capacity(), capacity);
    for i in 0..50 {
        assert!(!filter.lookup(&element(i)));
    }
}

#[test]
fn no_false_negatives_after_rejected_insert() {
    let mut filter = CuckooFilter::new(64);
    let accepted = fill_until_rejected(&mut filter);

    assert!(!accepted.is_empty());
    assert_eq!(filter.count(), accepted.len() as u64);
    for e in &accepted {
        assert!(filter.lookup(e), "lost {:?}", String::from_utf8_lossy(e));
    }
}

#[test]
fn rejected_insert_leaves_filter_unchanged() {
    let mut filter = CuckooFilter::new(16);
    fill_until_rejected(&mut filter);
    let mut before = filter.clone();

    for i in 10_000..10_050 {
        if !filter.insert(&element(i)) {
            assert_eq!(filter, before);
            return;
        }
        // A lucky insert relocates fingerprints; compare against the new
        // layout from here on.
        before = filter.clone();
    }
    panic!("a nearly full filter accepted 50 more elements");
}

#[test]
fn single_bucket_filter_fills_and_rejects() {
    let mut filter = CuckooFilter::new(0);
    let accepted = fill_until_rejected(&mut filter);
    assert_eq!(accepted.len(), ENTRIES_PER_BUCKET);
}

#[test]
fn false_positive_rate_is_low() {
    let mut filter = CuckooFilter::new(10_000);
    for i in 0..5_000 {
        assert!(filter.insert(&element(i)));
    }

    let false_positives = (5_000..15_000)
        .filter(|i| filter.lookup(&element(*i)))
        .count();

    // 16-bit fingerprints over 8 candidate slots: expected rate ~0.012%.
    let rate = false_positives as f64 / 10_000.0;
    assert!(rate < 0.01, "false positive rate too high: {rate}");
}

#[test]
fn high_load_factor_is_reachable() {
    let mut filter = CuckooFilter::new(4096);
    fill_until_rejected(&mut filter);
    assert!(filter.load_factor() > 0.9, "load {}", filter.load_factor());
}

#[test]
fn encode_decode_preserves_membership() {
    let mut filter = CuckooFilter::new(1000);
    for i in 0..500 {
        filter.insert(&element(i));
    }

    let encoded = filter.encode();
    assert_eq!(encoded.len(), filter.encoded_len());
    assert!(encoded.starts_with(MAGIC));

    let decoded = CuckooFilter::decode(&encoded).unwrap();
    assert_eq!(decoded, filter);
    assert_eq!(decoded.count(), 500);
    for i in 0..500 {
        assert!(decoded.lookup(&element(i)));
    }
}

#[test]
fn decode_rejects_bad_magic() {
    let mut encoded = CuckooFilter::new(8).encode().to_vec();
    encoded[0] = b'X';
    assert_eq!(CuckooFilter::decode(&encoded), Err(Error::BadMagic));
}

#[test]
fn decode_rejects_short_input() {
    assert!(matches!(
        CuckooFilter::decode(b"CKF1"),
        Err(Error::LengthMismatch { .. })
    ));
    assert!(matches!(
        CuckooFilter::decode(&[]),
        Err(Error::LengthMismatch { .. })
    ));
}

#[test]
fn decode_rejects_truncated_body() {
    let encoded = CuckooFilter::new(64).encode();
    let truncated = &encoded[..encoded.len() - 1];
    assert_eq!(
        CuckooFilter::decode(truncated),
        Err(Error::LengthMismatch {
            expected: encoded.len(),
            found: encoded.len() - 1,
        })
    );
}

#[test]
fn decode_rejects_bad_bucket_count() {
    let mut encoded = CuckooFilter::new(64).encode().to_vec();
    encoded[4..12].copy_from_slice(&3_u64.to_le_bytes());
    assert_eq!(CuckooFilter::decode(&encoded), Err(Error::BadBucketCount(3)));

    encoded[4..12].copy_from_slice(&0_u64.to_le_bytes());
    assert_eq!(CuckooFilter::decode(&encoded), Err(Error::BadBucketCount(0)));
}

#[test]
fn decode_rejects_count_mismatch() {
    let mut filter = CuckooFilter::new(64);
    filter.insert(b"jack");
    let mut encoded = filter.encode().to_vec();
    encoded[12..20].copy_from_slice(&5_u64.to_le_bytes());

    assert_eq!(
        CuckooFilter::decode(&encoded),
        Err(Error::CountMismatch {
            stored: 5,
            occupied: 1,
        })
    );
}
