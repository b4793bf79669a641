//! Registry operations behind each RPC.
//!
//! Every element operation first resolves the filter, so a missing filter
//! always yields [`FilterStatus::NoFilterFound`] before any other check
//! (including the batch ceiling).

use crate::server::registry::{FilterEntry, Registry};
use cuckoo_tonic_core::{
    FilterStatus,
    types::{MAX_BATCH_SIZE, MAX_FILTER_CAPACITY},
};
use std::sync::Arc;

/// Translates RPC-level operations into registry calls and status codes.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub const fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn resolve(&self, name: &str) -> Result<Arc<FilterEntry>, FilterStatus> {
        self.registry.get(name).ok_or(FilterStatus::NoFilterFound)
    }

    pub fn create_filter(&self, name: &str, capacity: u64) -> FilterStatus {
        if capacity > MAX_FILTER_CAPACITY {
            return FilterStatus::OverLimitation;
        }
        self.registry.create(name, capacity)
    }

    pub fn delete_filter(&self, name: &str) -> FilterStatus {
        self.registry.delete(name)
    }

    pub fn list_filters(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn insert_element(&self, name: &str, element: &str) -> FilterStatus {
        let entry = match self.resolve(name) {
            Ok(entry) => entry,
            Err(status) => return status,
        };

        if entry.write().insert(element.as_bytes()) {
            FilterStatus::Ok
        } else {
            FilterStatus::InsertionFailed
        }
    }

    /// Inserts every element independently; returns the rejected ones.
    ///
    /// Later elements are still attempted after an earlier rejection. The
    /// whole batch runs under one exclusive lock of the filter.
    pub fn insert_elements(&self, name: &str, elements: &[String]) -> (FilterStatus, Vec<String>) {
        let entry = match self.resolve(name) {
            Ok(entry) => entry,
            Err(status) => return (status, Vec::new()),
        };

        if elements.len() > MAX_BATCH_SIZE {
            return (FilterStatus::OverLimitation, Vec::new());
        }

        let failed: Vec<String> = {
            let mut guard = entry.write();
            elements
                .iter()
                .filter(|element| !guard.insert(element.as_bytes()))
                .cloned()
                .collect()
        };

        if failed.is_empty() {
            (FilterStatus::Ok, failed)
        } else {
            (FilterStatus::InsertionFailed, failed)
        }
    }

    pub fn delete_element(&self, name: &str, element: &str) -> FilterStatus {
        let entry = match self.resolve(name) {
            Ok(entry) => entry,
            Err(status) => return status,
        };

        if entry.write().delete(element.as_bytes()) {
            FilterStatus::Ok
        } else {
            FilterStatus::NoElementFound
        }
    }

    pub fn lookup_element(&self, name: &str, element: &str) -> FilterStatus {
        let entry = match self.resolve(name) {
            Ok(entry) => entry,
            Err(status) => return status,
        };

        if entry.read().lookup(element.as_bytes()) {
            FilterStatus::Ok
        } else {
            FilterStatus::NoElementFound
        }
    }

    /// Returns the matching elements in input order.
    ///
    /// An empty match list is reported as [`FilterStatus::NoElementFound`].
    pub fn lookup_elements(&self, name: &str, elements: &[String]) -> (FilterStatus, Vec<String>) {
        let entry = match self.resolve(name) {
            Ok(entry) => entry,
            Err(status) => return (status, Vec::new()),
        };

        if elements.len() > MAX_BATCH_SIZE {
            return (FilterStatus::OverLimitation, Vec::new());
        }

        let matched: Vec<String> = {
            let guard = entry.read();
            elements
                .iter()
                .filter(|element| guard.lookup(element.as_bytes()))
                .cloned()
                .collect()
        };

        if matched.is_empty() {
            (FilterStatus::NoElementFound, matched)
        } else {
            (FilterStatus::Ok, matched)
        }
    }

    pub fn count_elements(&self, name: &str) -> (FilterStatus, u64) {
        match self.resolve(name) {
            Ok(entry) => (FilterStatus::Ok, entry.read().count()),
            Err(status) => (status, 0),
        }
    }

    /// Empties the filter in place; the entry and its capacity are kept.
    pub fn reset_filter(&self, name: &str) -> FilterStatus {
        match self.resolve(name) {
            Ok(entry) => {
                entry.write().reset();
                FilterStatus::Ok
            }
            Err(status) => status,
        }
    }
}
