/// Number of fingerprint slots in every bucket.
pub const ENTRIES_PER_BUCKET: usize = 4;

/// Fingerprint stored in each slot. Zero marks an empty slot.
pub type Fingerprint = u16;

const EMPTY: Fingerprint = 0;

/// A fixed-size group of fingerprint slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Bucket {
    slots: [Fingerprint; ENTRIES_PER_BUCKET],
}

impl Bucket {
    pub(crate) const fn from_slots(slots: [Fingerprint; ENTRIES_PER_BUCKET]) -> Self {
        Self { slots }
    }

    pub(crate) const fn slots(&self) -> &[Fingerprint; ENTRIES_PER_BUCKET] {
        &self.slots
    }

    /// Stores `fp` in the first empty slot. Returns `false` if the bucket is
    /// full.
    pub(crate) fn insert(&mut self, fp: Fingerprint) -> bool {
        match self.slots.iter_mut().find(|slot| **slot == EMPTY) {
            Some(slot) => {
                *slot = fp;
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, fp: Fingerprint) -> bool {
        self.slots.contains(&fp)
    }

    /// Clears one slot holding `fp`.
    pub(crate) fn remove(&mut self, fp: Fingerprint) -> bool {
        match self.slots.iter_mut().find(|slot| **slot == fp) {
            Some(slot) => {
                *slot = EMPTY;
                true
            }
            None => false,
        }
    }

    /// Puts `fp` into `slot` and hands back whatever was there.
    pub(crate) fn replace(&mut self, slot: usize, fp: Fingerprint) -> Fingerprint {
        core::mem::replace(&mut self.slots[slot], fp)
    }

    pub(crate) fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| **slot != EMPTY).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_fills_slots_in_order() {
        let mut bucket = Bucket::default();
        for fp in 1..=ENTRIES_PER_BUCKET as Fingerprint {
            assert!(bucket.insert(fp));
        }
        assert!(!bucket.insert(99));
        assert_eq!(bucket.slots(), &[1, 2, 3, 4]);
        assert_eq!(bucket.occupied(), ENTRIES_PER_BUCKET);
    }

    #[test]
    fn remove_clears_a_single_copy() {
        let mut bucket = Bucket::default();
        bucket.insert(7);
        bucket.insert(7);

        assert!(bucket.remove(7));
        assert!(bucket.contains(7));
        assert!(bucket.remove(7));
        assert!(!bucket.contains(7));
        assert!(!bucket.remove(7));
    }

    #[test]
    fn replace_returns_previous_fingerprint() {
        let mut bucket = Bucket::from_slots([1, 2, 3, 4]);
        assert_eq!(bucket.replace(2, 9), 3);
        assert_eq!(bucket.slots(), &[1, 2, 9, 4]);
    }
}
