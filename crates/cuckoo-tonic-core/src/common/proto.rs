//! gRPC service and message definitions generated from `proto/cuckoo.proto`.
//!
//! ## Service
//!
//! - `CuckooFilter` - named filter lifecycle, element mutation and lookup,
//!   plus the bidirectional `LookupElementsStream`.
//!
//! Every unary response embeds a [`Status`] whose `code`/`msg` come from
//! [`crate::FilterStatus`].

tonic::include_proto!("cuckoofilter");

/// Encoded file descriptor set for gRPC server reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("cuckoo_descriptor");
