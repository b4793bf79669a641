//! Bidirectional streaming lookup sessions.
//!
//! - [`coordinator`] - Reader loop that consumes requests and queues matches.
//! - [`processor`] - Evaluation of a single streamed lookup.

pub mod coordinator;
pub mod processor;
