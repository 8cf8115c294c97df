//! Per-resource fetch coordination within one session.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rangemap::RangeSet;
use sb_core::config::FetchPriority;
use sb_core::{ResourceRef, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::substrate::{FetchRequest, FetchSubstrate, OPEN_END};
use crate::transfer::TransferContext;

const CHUNK_QUEUE: usize = 16;

/// Fetch state for one resource: the transfer file, the span of bytes being
/// fetched right now, and the background tasks doing it.
///
/// Dropping the context cancels its fetches and deletes the transfer files.
pub struct FetchContext {
    resource: ResourceRef,
    transfer: Arc<TransferContext>,
    substrate: Arc<dyn FetchSubstrate>,
    priority: FetchPriority,
    cancel: CancellationToken,
    in_flight: Arc<Mutex<RangeSet<u64>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FetchContext {
    pub fn open(
        resource: ResourceRef,
        substrate: Arc<dyn FetchSubstrate>,
        temp_dir: &Path,
        priority: FetchPriority,
    ) -> Result<Self> {
        let transfer = TransferContext::create(temp_dir, resource.id.clone(), resource.size)?;
        Ok(Self {
            resource,
            transfer: Arc::new(transfer),
            substrate,
            priority,
            cancel: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(RangeSet::new())),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn transfer(&self) -> &Arc<TransferContext> {
        &self.transfer
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every fetch started by this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Byte span currently being fetched.
    pub fn in_flight(&self) -> Vec<Range<u64>> {
        self.in_flight.lock().iter().cloned().collect()
    }

    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.len()
    }

    /// Make sure every byte of `range` is either available or being fetched.
    ///
    /// Only the gaps not already covered or in flight are requested, so
    /// overlapping calls never fetch the same byte twice.
    pub fn ensure(&self, range: Range<u64>) {
        if self.cancel.is_cancelled() {
            return;
        }

        let gaps: Vec<Range<u64>> = {
            // Coverage is read under the in-flight lock. A fetch publishes its
            // writes before it takes the lock to drop its span, so a span is
            // always seen as covered or in flight.
            let mut in_flight = self.in_flight.lock();
            let coverage = self.transfer.coverage();
            let range = coverage.clip(range);
            if range.start >= range.end {
                return;
            }
            let mut known = in_flight.clone();
            for covered in coverage.intervals() {
                known.insert(covered.clone());
            }
            let gaps: Vec<_> = known.gaps(&range).collect();
            for gap in &gaps {
                in_flight.insert(gap.clone());
            }
            gaps
        };

        for gap in gaps {
            self.spawn_fetch(gap);
        }
    }

    /// Pull the whole resource in the background.
    pub fn prefetch_all(&self) {
        let end = self
            .transfer
            .coverage()
            .total_size()
            .or(self.resource.size)
            .unwrap_or(OPEN_END);
        self.ensure(0..end);
    }

    fn spawn_fetch(&self, range: Range<u64>) {
        tracing::debug!(
            resource = %self.resource.id,
            start = range.start,
            end = range.end,
            "Fetching range"
        );

        let token = self.cancel.child_token();
        let request = FetchRequest {
            resource: self.resource.clone(),
            range: range.clone(),
            priority: self.priority,
            cancel: token.clone(),
        };
        let substrate = self.substrate.clone();
        let transfer = self.transfer.clone();
        let in_flight = self.in_flight.clone();

        let handle = tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(CHUNK_QUEUE);

            let pump = async {
                while let Some(chunk) = rx.recv().await {
                    transfer.write_chunk(&chunk).await?;
                }
                Ok::<_, sb_core::Error>(())
            };

            let (fetched, written) = tokio::join!(substrate.fetch(request, tx), pump);

            fail_in_flight(&in_flight, &range);

            if token.is_cancelled() {
                tracing::trace!(resource = %transfer.resource(), "Fetch cancelled");
                return;
            }
            let failure = match (fetched, written) {
                (Err(e), _) => Some(format!("fetch failed: {e}")),
                (_, Err(e)) => Some(format!("writing fetched data failed: {e}")),
                _ => None,
            };
            // Not retried; the next request for the span issues a new fetch.
            if let Some(reason) = failure {
                tracing::warn!(
                    resource = %transfer.resource(),
                    start = range.start,
                    end = range.end,
                    "{reason}"
                );
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }
}

/// Forget `range` as in flight once its fetch has ended, successfully or not.
fn fail_in_flight(in_flight: &Mutex<RangeSet<u64>>, range: &Range<u64>) {
    in_flight.lock().remove(range.clone());
}

impl Drop for FetchContext {
    fn drop(&mut self) {
        self.cancel();
        self.transfer.release();
        tracing::debug!(resource = %self.resource.id, "Fetch context dropped");
    }
}
