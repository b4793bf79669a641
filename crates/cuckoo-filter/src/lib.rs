#![doc = include_str!("../README.md")]

mod bucket;
mod error;
mod filter;
mod hash;

pub use crate::bucket::{ENTRIES_PER_BUCKET, Fingerprint};
pub use crate::error::*;
pub use crate::filter::*;
