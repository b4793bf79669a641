//! # Shared Types and Constants
//!
//! Definitions that clients and servers must agree on.
//!
//! ## Type Aliases
//!
//! - [`Filter`] - The membership structure held by every registry entry
//!   (backed by [`CuckooFilter`]).
//!
//! ## Constants
//!
//! - [`MAX_BATCH_SIZE`] - Batch ceiling for `InsertElements` and
//!   `LookupElements`.
//! - [`MAX_FILTER_CAPACITY`] - Largest capacity `CreateFilter` accepts.
//!
//! > ⚠️ [`Filter`] fixes the snapshot encoding at compile time. Snapshot
//! > directories written by one build can only be loaded by builds using the
//! > same membership structure.

use cuckoo_filter::CuckooFilter;

/// The membership structure used by the registry.
pub type Filter = CuckooFilter;

/// Maximum number of elements accepted by one batched insert or lookup.
pub const MAX_BATCH_SIZE: usize = 5000;

/// Largest capacity hint a filter may be created with.
pub const MAX_FILTER_CAPACITY: u64 = cuckoo_filter::MAX_CAPACITY;
