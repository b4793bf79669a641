//! Protocol, status and error definitions shared by server and client.

pub mod error;
pub mod proto;
pub mod status;
pub mod types;

pub use error::{Error, Result};
pub use status::FilterStatus;
