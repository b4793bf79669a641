//! Filter registry server.
//!
//! ## Structure
//!
//! - [`config`] - CLI/environment configuration.
//! - [`registry`] - Name-to-filter mapping and its locking discipline.
//! - [`service`] - gRPC service (`FilterService`) and request dispatch.
//! - [`streaming`] - Bidirectional streaming lookup sessions.
//! - [`snapshot`] - Atomic dump/load and the periodic dump scheduler.
//! - [`telemetry`] - Logging, tracing and metrics setup.

pub mod config;
pub mod registry;
pub mod service;
pub mod snapshot;
pub mod streaming;
pub mod telemetry;
