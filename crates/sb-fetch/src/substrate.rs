//! The fetch substrate contract.
//!
//! A substrate resolves a [`ResourceId`] into bytes. It exposes two paths: a
//! synchronous lookup that answers only from data it already holds, and an
//! asynchronous ranged fetch that streams chunks into a channel until the range
//! is delivered, the request token is cancelled, or the receiver goes away.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sb_core::config::{FetchPriority, SubstrateConfig, SubstrateKind};
use sb_core::{ResourceId, ResourceRef};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dir::DirSubstrate;
use crate::http::HttpSubstrate;
use crate::memory::MemoryCache;

/// End offset used for open-ended fetches when the resource size is unknown.
pub const OPEN_END: u64 = u64::MAX;

/// A ranged fetch issued against a substrate.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub resource: ResourceRef,
    /// Half-open byte range; `end == OPEN_END` means "to the end".
    pub range: Range<u64>,
    pub priority: FetchPriority,
    /// Cancelled by the owner to stop the fetch early.
    pub cancel: CancellationToken,
}

/// A piece of resource data delivered by a substrate.
#[derive(Debug, Clone)]
pub struct FetchedChunk {
    pub offset: u64,
    pub data: Bytes,
    /// Total resource size, once the substrate knows it.
    pub total_size: Option<u64>,
}

impl FetchedChunk {
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.data.len() as u64
    }
}

#[async_trait]
pub trait FetchSubstrate: Send + Sync + 'static {
    /// Bytes of `range` the substrate already holds, without fetching.
    ///
    /// May return fewer bytes than asked for when the range runs past the end
    /// of the resource. `None` means nothing usable is cached.
    fn cached_slice(&self, resource: &ResourceId, size: Option<u64>, range: Range<u64>) -> Option<Bytes>;

    /// Fetch `request.range`, sending chunks to `sink` as they arrive.
    ///
    /// Returns once the range is delivered, the request is cancelled, or
    /// `sink` is closed.
    async fn fetch(&self, request: FetchRequest, sink: mpsc::Sender<FetchedChunk>) -> sb_core::Result<()>;
}

/// Build the substrate selected in configuration.
pub fn build_substrate(config: &SubstrateConfig) -> sb_core::Result<Arc<dyn FetchSubstrate>> {
    let substrate: Arc<dyn FetchSubstrate> = match config.kind {
        SubstrateKind::Http => {
            let cache = Arc::new(MemoryCache::new(config.memory_cache_bytes));
            Arc::new(HttpSubstrate::new(&config.base_url, cache, config.effective_chunk_size())?)
        }
        SubstrateKind::Dir => Arc::new(
            DirSubstrate::new(&config.root, config.effective_chunk_size()).with_cached(config.dir_cached),
        ),
    };
    tracing::info!(kind = ?config.kind, "Fetch substrate ready");
    Ok(substrate)
}

/// Send a chunk unless the request was cancelled first.
///
/// Returns `false` when the fetch should stop.
pub(crate) async fn deliver(
    sink: &mpsc::Sender<FetchedChunk>,
    cancel: &CancellationToken,
    chunk: FetchedChunk,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = sink.send(chunk) => sent.is_ok(),
    }
}
