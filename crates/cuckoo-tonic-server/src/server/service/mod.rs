//! gRPC service implementation and request dispatch.
//!
//! ## Structure
//!
//! - [`dispatcher`] - Registry operations and their status outcomes.
//! - [`handler`] - gRPC service entry point (`FilterService`).

pub mod dispatcher;
pub mod handler;
