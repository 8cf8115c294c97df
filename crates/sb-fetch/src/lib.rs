//! sb-fetch: byte-range fetching on top of an external fetch substrate.
//!
//! The bridge never talks to storage directly. It consumes a
//! [`FetchSubstrate`] (range fetch plus synchronous cache lookup) and builds
//! per-session machinery on top of it:
//!
//! - [`CachedRange`] - disjoint byte intervals already materialized locally
//! - [`TransferContext`] - file-backed accumulation of one resource's bytes
//! - [`FetchContext`] - per-resource, per-session fetch coordination
//! - [`SegmentRangeServer`] - resolves `(resource, range)` into a temp file
//!
//! Two substrates ship with the crate: [`HttpSubstrate`] fetches from a remote
//! origin with HTTP range requests, [`DirSubstrate`] serves a local directory.

pub mod context;
pub mod dir;
pub mod http;
pub mod memory;
pub mod ranges;
pub mod segment;
pub mod substrate;
pub mod transfer;

pub use context::FetchContext;
pub use dir::DirSubstrate;
pub use http::HttpSubstrate;
pub use memory::MemoryCache;
pub use ranges::CachedRange;
pub use segment::{SegmentChunk, SegmentRangeServer, SegmentRequest, SegmentSettings};
pub use substrate::{build_substrate, FetchRequest, FetchSubstrate, FetchedChunk};
pub use transfer::{TransferContext, TransferPaths};
