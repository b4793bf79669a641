//! Name-to-filter registry.
//!
//! The [`Registry`] is the only owner of the name mapping. Callers resolve a
//! name to a shared [`FilterEntry`] and then lock that entry on its own, so a
//! busy filter never stalls traffic against unrelated names.
//!
//! ## Locking
//!
//! - The map lock is held only to add, remove, resolve or copy entries.
//! - Each entry carries its own `RwLock`: mutations (insert, delete, reset)
//!   take it exclusively, lookups/counts/encodes take it shared.
//! - Neither lock is ever held across an `.await`; both are `parking_lot`
//!   guards, which are `!Send` and so cannot leak into a spawned future.

use cuckoo_tonic_core::{FilterStatus, types::Filter};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

/// A registered filter and the capacity it was created with.
#[derive(Debug)]
pub struct FilterEntry {
    capacity: u64,
    filter: RwLock<Filter>,
}

impl FilterEntry {
    pub fn new(capacity: u64, filter: Filter) -> Self {
        Self {
            capacity,
            filter: RwLock::new(filter),
        }
    }

    /// Capacity hint supplied at creation (or implied by a loaded snapshot).
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Filter> {
        self.filter.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Filter> {
        self.filter.write()
    }
}

/// Thread-safe mapping from filter name to [`FilterEntry`].
#[derive(Debug, Default)]
pub struct Registry {
    filters: RwLock<HashMap<String, Arc<FilterEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new, empty filter under `name`.
    ///
    /// Returns [`FilterStatus::FilterAlreadyExist`] if the name is taken and
    /// [`FilterStatus::OverLimitation`] if the filter cannot be built for the
    /// requested capacity. The existing filter is never touched.
    pub fn create(&self, name: &str, capacity: u64) -> FilterStatus {
        // Cheap early exit; the authoritative check happens under the write
        // lock below.
        if self.contains(name) {
            return FilterStatus::FilterAlreadyExist;
        }

        // Allocation can be large, so build outside the map lock.
        let filter = match Filter::try_new(capacity) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::debug!(filter = name, capacity, "Rejected filter capacity: {e}");
                return FilterStatus::OverLimitation;
            }
        };

        match self.filters.write().entry(name.to_owned()) {
            Entry::Occupied(_) => FilterStatus::FilterAlreadyExist,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(FilterEntry::new(capacity, filter)));
                FilterStatus::Ok
            }
        }
    }

    /// Removes the filter registered under `name`.
    pub fn delete(&self, name: &str) -> FilterStatus {
        match self.filters.write().remove(name) {
            Some(_) => FilterStatus::Ok,
            None => FilterStatus::NoFilterFound,
        }
    }

    /// Resolves `name` to its entry.
    pub fn get(&self, name: &str) -> Option<Arc<FilterEntry>> {
        self.filters.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.read().contains_key(name)
    }

    /// Names of every registered filter, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.filters.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    /// Point-in-time copy of the mapping.
    ///
    /// Entries created or deleted afterwards are not reflected; the returned
    /// entries remain lockable and reflect later mutations of their filters.
    pub fn snapshot(&self) -> Vec<(String, Arc<FilterEntry>)> {
        self.filters
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect()
    }

    /// Installs already-decoded filters, replacing any entry with the same
    /// name. All filters become visible under a single lock acquisition.
    pub fn restore(&self, filters: impl IntoIterator<Item = (String, Filter)>) {
        let entries: Vec<_> = filters
            .into_iter()
            .map(|(name, filter)| {
                let capacity = filter.capacity();
                (name, Arc::new(FilterEntry::new(capacity, filter)))
            })
            .collect();

        self.filters.write().extend(entries);
    }
}
