#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates can reach the membership structure via
// `cuckoo_tonic_core::cuckoo_filter`
pub use cuckoo_filter;
