//! Snapshot persistence of the registry.
//!
//! - [`manager`] - Atomic dump to, and fail-closed load from, a directory.
//! - [`naming`] - Reversible filter-name to file-name mapping.
//! - [`scheduler`] - Periodic, non-overlapping dumps with drain on shutdown.

pub mod manager;
pub mod naming;
pub mod scheduler;

pub use manager::{DumpReport, SnapshotManager};
pub use scheduler::{DumpScheduler, SchedulerState};
