//! Response status taxonomy.
//!
//! Every RPC response carries one of these values. They describe expected,
//! recoverable outcomes and are never surfaced as gRPC errors.

use crate::{proto, types::MAX_BATCH_SIZE};
use core::fmt;

/// Outcome of a registry operation, carried in the response payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterStatus {
    /// The operation succeeded.
    Ok,
    /// No filter is registered under the requested name.
    NoFilterFound,
    /// The filter rejected one or more elements, usually because it is close
    /// to capacity. Recreate the filter with a larger capacity rather than
    /// retrying.
    InsertionFailed,
    /// The element is not in the filter.
    NoElementFound,
    /// The batch (or requested capacity) exceeds the service limits.
    OverLimitation,
    /// A filter with the requested name already exists.
    FilterAlreadyExist,
}

impl FilterStatus {
    /// Every status, in code order.
    pub const ALL: [Self; 6] = [
        Self::Ok,
        Self::NoFilterFound,
        Self::InsertionFailed,
        Self::NoElementFound,
        Self::OverLimitation,
        Self::FilterAlreadyExist,
    ];

    /// Numeric code sent on the wire.
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::NoFilterFound => 1,
            Self::InsertionFailed => 2,
            Self::NoElementFound => 3,
            Self::OverLimitation => 4,
            Self::FilterAlreadyExist => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Converts into the wire message embedded in responses.
    pub fn into_proto(self) -> Option<proto::Status> {
        Some(self.into())
    }
}

impl fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::NoFilterFound => f.write_str("No filter found."),
            Self::InsertionFailed => f.write_str(
                "Insertion failed. To increase success rate of inserts, create a larger filter.",
            ),
            Self::NoElementFound => f.write_str("No element found."),
            Self::OverLimitation => {
                write!(f, "Elements amount over {MAX_BATCH_SIZE} limitation")
            }
            Self::FilterAlreadyExist => f.write_str("Filter already exist"),
        }
    }
}

impl From<FilterStatus> for proto::Status {
    fn from(status: FilterStatus) -> Self {
        Self {
            code: status.code(),
            msg: status.to_string(),
        }
    }
}
