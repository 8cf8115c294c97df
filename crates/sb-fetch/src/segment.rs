//! Segment Range Server: resolve `(resource, byte range)` into a temp file.
//!
//! Lookups go to the substrate cache first and complete synchronously on a
//! hit. On a miss the session's [`FetchContext`] for the resource is leased,
//! the missing spans are fetched, and a task waits for the range to become
//! available before copying it out.

use std::collections::HashMap;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sb_core::config::{BridgeConfig, FetchPriority};
use sb_core::{ResourceId, ResourceRef, Result};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::FetchContext;
use crate::substrate::FetchSubstrate;
use crate::transfer::TransferContext;

/// Satisfied slice of a resource, copied into a file owned by the consumer.
#[derive(Debug)]
pub struct SegmentChunk {
    /// Deleted when dropped.
    pub file: NamedTempFile,
    /// Absolute byte offsets within the resource.
    pub available: Range<u64>,
    pub total_size: u64,
}

impl SegmentChunk {
    pub fn len(&self) -> u64 {
        self.available.end - self.available.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Pending or completed result of [`SegmentRangeServer::fetch_range`].
///
/// Resolves at most once. [`dispose`](Self::dispose) may be called any number
/// of times, before or after completion; dropping the request disposes it.
pub struct SegmentRequest {
    ready: Option<Option<SegmentChunk>>,
    task: Option<JoinHandle<Option<SegmentChunk>>>,
    cancel: CancellationToken,
    lease: Mutex<Option<Arc<FetchContext>>>,
    disposed: AtomicBool,
}

impl SegmentRequest {
    fn ready(chunk: Option<SegmentChunk>) -> Self {
        Self {
            ready: Some(chunk),
            task: None,
            cancel: CancellationToken::new(),
            lease: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    fn pending(
        task: JoinHandle<Option<SegmentChunk>>,
        cancel: CancellationToken,
        lease: Arc<FetchContext>,
    ) -> Self {
        Self {
            ready: None,
            task: Some(task),
            cancel,
            lease: Mutex::new(Some(lease)),
            disposed: AtomicBool::new(false),
        }
    }

    /// True when the result is already available without waiting.
    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Wait for the chunk.
    ///
    /// Returns `None` for ranges past the end of the resource, after
    /// disposal, and on every call after the first.
    pub async fn wait(&mut self) -> Option<SegmentChunk> {
        if self.is_disposed() {
            return None;
        }
        if let Some(chunk) = self.ready.take() {
            return chunk;
        }
        let task = self.task.as_mut()?;
        let chunk = match task.await {
            Ok(chunk) => chunk,
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::warn!("Segment request task failed: {e}");
                }
                None
            }
        };
        self.task = None;
        self.release_lease();
        chunk
    }

    /// Cancel the request and release its fetch context lease.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
        self.release_lease();
    }

    fn release_lease(&self) {
        // Dropping the last lease drops the context and its files.
        let lease = self.lease.lock().take();
        drop(lease);
    }
}

impl Drop for SegmentRequest {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SegmentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRequest")
            .field("ready", &self.ready.is_some())
            .field("pending", &self.task.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Settings shared by every request of a server.
#[derive(Debug, Clone)]
pub struct SegmentSettings {
    pub temp_dir: PathBuf,
    pub priority: FetchPriority,
    /// Pull the whole resource after a miss.
    pub prefetch_full: bool,
}

impl SegmentSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            temp_dir: config.temp_dir(),
            priority: config.fetch_priority,
            prefetch_full: config.prefetch_full_resource,
        }
    }
}

/// Per-session range server.
///
/// Fetch contexts are held weakly; each pending request holds a lease that
/// keeps its context alive.
pub struct SegmentRangeServer {
    substrate: Arc<dyn FetchSubstrate>,
    settings: SegmentSettings,
    contexts: Mutex<HashMap<ResourceId, Weak<FetchContext>>>,
    closed: AtomicBool,
}

impl SegmentRangeServer {
    pub fn new(substrate: Arc<dyn FetchSubstrate>, settings: SegmentSettings) -> Self {
        Self {
            substrate,
            settings,
            contexts: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &SegmentSettings {
        &self.settings
    }

    /// Resolve `range` of `resource` into a [`SegmentRequest`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn fetch_range(
        &self,
        resource: &ResourceRef,
        range: Range<u64>,
        total_size_hint: Option<u64>,
    ) -> SegmentRequest {
        let size = resource.size.or(total_size_hint);
        let range = match size {
            Some(total) => range.start..range.end.min(total),
            None => range,
        };
        if self.closed.load(Ordering::Acquire) || range.start >= range.end {
            return SegmentRequest::ready(None);
        }

        // A hit cannot report the resource total, so unknown sizes always
        // go through the fetch path.
        if let Some(total_size) = size {
            if let Some(bytes) = self.substrate.cached_slice(&resource.id, size, range.clone()) {
                if !bytes.is_empty() {
                    let available = range.start..range.start + bytes.len() as u64;
                    match write_temp_file(&self.settings.temp_dir, &bytes) {
                        Ok(file) => {
                            tracing::trace!(resource = %resource.id, ?available, "Segment served from cache");
                            return SegmentRequest::ready(Some(SegmentChunk {
                                file,
                                total_size,
                                available,
                            }));
                        }
                        Err(e) => {
                            tracing::warn!(resource = %resource.id, "Failed to stage cached bytes: {e}");
                        }
                    }
                }
            }
        }

        let ctx = match self.lease(resource) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(resource = %resource.id, "Failed to open fetch context: {e}");
                return SegmentRequest::ready(None);
            }
        };
        ctx.ensure(range.clone());
        if self.settings.prefetch_full {
            ctx.prefetch_all();
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(await_range(
            ctx.transfer().clone(),
            ctx.cancel_token().clone(),
            cancel.clone(),
            range,
            size,
            self.settings.temp_dir.clone(),
        ));
        SegmentRequest::pending(task, cancel, ctx)
    }

    /// Fetch the whole resource in the background within a fresh lease.
    ///
    /// The fetch runs for as long as the returned request is alive.
    pub fn prefetch_complete(&self, resource: &ResourceRef) -> SegmentRequest {
        let end = resource.size.unwrap_or(crate::substrate::OPEN_END);
        self.fetch_range(resource, 0..end, resource.size)
    }

    fn lease(&self, resource: &ResourceRef) -> Result<Arc<FetchContext>> {
        let mut contexts = self.contexts.lock();
        contexts.retain(|_, ctx| ctx.strong_count() > 0);

        if let Some(ctx) = contexts.get(&resource.id).and_then(Weak::upgrade) {
            if !ctx.is_cancelled() {
                return Ok(ctx);
            }
        }

        let ctx = Arc::new(FetchContext::open(
            resource.clone(),
            self.substrate.clone(),
            &self.settings.temp_dir,
            self.settings.priority,
        )?);
        contexts.insert(resource.id.clone(), Arc::downgrade(&ctx));
        Ok(ctx)
    }

    /// Number of fetch contexts currently kept alive by requests.
    pub fn active_contexts(&self) -> usize {
        self.contexts
            .lock()
            .values()
            .filter(|ctx| ctx.strong_count() > 0)
            .count()
    }

    /// Cancel every live fetch context and refuse new requests.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let contexts: Vec<_> = self.contexts.lock().drain().collect();
        for (id, ctx) in contexts {
            if let Some(ctx) = ctx.upgrade() {
                tracing::debug!(resource = %id, "Cancelling fetch context");
                ctx.cancel();
                ctx.transfer().release();
            }
        }
    }
}

impl Drop for SegmentRangeServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn await_range(
    transfer: Arc<TransferContext>,
    context_cancel: CancellationToken,
    cancel: CancellationToken,
    range: Range<u64>,
    size: Option<u64>,
    temp_dir: PathBuf,
) -> Option<SegmentChunk> {
    let mut available = transfer.subscribe();
    let covered = async {
        available
            .wait_for(|coverage| coverage.satisfies(&range))
            .await
            .map(|coverage| coverage.clone())
            .ok()
    };

    let coverage = tokio::select! {
        coverage = covered => coverage?,
        _ = context_cancel.cancelled() => return None,
        _ = cancel.cancelled() => return None,
    };

    let clipped = coverage.clip(range);
    if clipped.start >= clipped.end {
        return None;
    }

    let data = match transfer.read_range(clipped.clone()).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(resource = %transfer.resource(), "Failed to read transfer: {e}");
            return None;
        }
    };

    let staged = tokio::task::spawn_blocking(move || write_temp_file(&temp_dir, &data)).await;
    let file = match staged {
        Ok(Ok(file)) => file,
        Ok(Err(e)) => {
            tracing::warn!(resource = %transfer.resource(), "Failed to stage segment: {e}");
            return None;
        }
        Err(e) => {
            tracing::warn!("Segment staging task failed: {e}");
            return None;
        }
    };

    Some(SegmentChunk {
        file,
        total_size: coverage.total_size().or(size).unwrap_or(clipped.end),
        available: clipped,
    })
}

fn write_temp_file(dir: &Path, data: &[u8]) -> Result<NamedTempFile> {
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("sb-segment-")
        .suffix(".mp4")
        .tempfile_in(dir)?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}
