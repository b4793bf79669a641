//! Error types for the filter registry service.
//!
//! This module defines the central `Error` enum, which captures every failure
//! that is *not* a domain outcome. Missing filters, missing elements and
//! limits are reported as [`crate::FilterStatus`] values inside successful
//! responses; the cases below are operational failures. `From<Error>` for
//! `tonic::Status` maps them onto gRPC status codes.
//!
//! ## Error Cases
//! - `RequestCancelled`: The client went away mid-stream.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.
//! - `Stream`: The inbound half of a streaming call failed.
//! - `Io`: Reading or writing the snapshot directory failed.
//! - `Decode`: A snapshot file did not contain a valid filter.
//! - `InvalidSnapshotName`: A snapshot file name could not be mapped back to a
//!   filter name.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the filter registry service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// Receiving from a client stream failed.
    #[error("Stream error: {}", .0.message())]
    Stream(Status),

    /// Snapshot directory I/O failed.
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file could not be decoded into a filter.
    #[error("Failed to decode snapshot for filter `{name}`")]
    Decode {
        name: String,
        #[source]
        source: cuckoo_filter::Error,
    },

    /// A snapshot file name is not a valid encoding of a filter name.
    #[error("Invalid snapshot file name: {file_name}")]
    InvalidSnapshotName { file_name: String },
}

impl Error {
    /// Builds an [`Error::Io`] with a human-readable context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
            Error::Stream(status) => status,
            e @ (Error::Io { .. } | Error::Decode { .. } | Error::InvalidSnapshotName { .. }) => {
                Status::internal(e.to_string())
            }
        }
    }
}
