//! File-backed accumulation of one resource's bytes.
//!
//! A transfer owns a private temp directory holding three files:
//!
//! - `partial` - sparse file receiving chunks at their offsets
//! - `complete` - the same file once every byte has arrived
//! - `meta.json` - persisted coverage and total size
//!
//! Readers subscribe to a watch channel that publishes the coverage after
//! every write.

use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};

use sb_core::{Error, ResourceId, Result};
use tempfile::TempDir;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex};

use crate::ranges::CachedRange;
use crate::substrate::FetchedChunk;

/// Locations of a transfer's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPaths {
    pub dir: PathBuf,
    pub complete: PathBuf,
    pub partial: PathBuf,
    pub meta: PathBuf,
}

impl TransferPaths {
    fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            complete: dir.join("complete"),
            partial: dir.join("partial"),
            meta: dir.join("meta.json"),
        }
    }
}

struct TransferState {
    file: File,
    coverage: CachedRange,
    completed: bool,
}

pub struct TransferContext {
    resource: ResourceId,
    paths: TransferPaths,
    dir: parking_lot::Mutex<Option<TempDir>>,
    state: Mutex<TransferState>,
    available: watch::Sender<CachedRange>,
}

impl TransferContext {
    /// Create the transfer directory under `parent` and open the partial file.
    pub fn create(parent: &Path, resource: ResourceId, total_size: Option<u64>) -> Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new().prefix("sb-transfer-").tempdir_in(parent)?;
        let paths = TransferPaths::in_dir(dir.path());

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&paths.partial)?;
        let coverage = CachedRange::new(total_size);
        std::fs::write(&paths.meta, meta_json(&coverage)?)?;

        tracing::debug!(resource = %resource, dir = %paths.dir.display(), "Transfer created");

        let (available, _) = watch::channel(coverage.clone());
        Ok(Self {
            resource,
            paths,
            dir: parking_lot::Mutex::new(Some(dir)),
            state: Mutex::new(TransferState {
                file: File::from_std(file),
                coverage,
                completed: false,
            }),
            available,
        })
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn paths(&self) -> &TransferPaths {
        &self.paths
    }

    /// Current coverage, without waiting for the file lock.
    pub fn coverage(&self) -> CachedRange {
        self.available.borrow().clone()
    }

    /// Receiver notified after every write.
    pub fn subscribe(&self) -> watch::Receiver<CachedRange> {
        self.available.subscribe()
    }

    /// Write a delivered chunk at its offset and publish the new coverage.
    ///
    /// Once the whole resource is present the partial file is renamed to
    /// `complete`.
    pub async fn write_chunk(&self, chunk: &FetchedChunk) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(total) = chunk.total_size {
            state.coverage.set_total_size(total);
        }
        let range = state.coverage.clip(chunk.range());
        if range.start < range.end && !state.coverage.covers(&range) {
            let len = (range.end - range.start) as usize;
            state.file.seek(SeekFrom::Start(range.start)).await?;
            state.file.write_all(&chunk.data[..len]).await?;
            state.coverage.insert(range);
        }

        if !state.completed && state.coverage.is_complete() {
            state.file.flush().await?;
            tokio::fs::rename(&self.paths.partial, &self.paths.complete).await?;
            state.file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.paths.complete)
                .await?;
            state.completed = true;
            tracing::debug!(resource = %self.resource, "Transfer complete");
        }

        tokio::fs::write(&self.paths.meta, meta_json(&state.coverage)?).await?;
        self.available.send_replace(state.coverage.clone());
        Ok(())
    }

    /// Read `range` from the backing file. The range must be covered.
    pub async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        if !state.coverage.covers(&range) {
            return Err(Error::Internal(format!(
                "read of uncovered range {}..{} in {}",
                range.start, range.end, self.resource
            )));
        }
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        state.file.seek(SeekFrom::Start(range.start)).await?;
        state.file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    pub async fn is_complete(&self) -> bool {
        self.state.lock().await.completed
    }

    /// Delete the transfer directory.
    ///
    /// Returns `true` the first time only; later calls do nothing.
    pub fn release(&self) -> bool {
        let Some(dir) = self.dir.lock().take() else {
            return false;
        };
        if let Err(e) = dir.close() {
            tracing::warn!(resource = %self.resource, "Failed to remove transfer dir: {e}");
        } else {
            tracing::debug!(resource = %self.resource, "Transfer released");
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.dir.lock().is_none()
    }
}

fn meta_json(coverage: &CachedRange) -> Result<Vec<u8>> {
    serde_json::to_vec(&coverage.to_meta()).map_err(|e| Error::Internal(format!("transfer meta: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::ranges::CoverageMeta;

    fn chunk(offset: u64, data: &'static [u8], total: Option<u64>) -> FetchedChunk {
        FetchedChunk {
            offset,
            data: Bytes::from_static(data),
            total_size: total,
        }
    }

    #[tokio::test]
    async fn chunks_accumulate_and_complete() {
        let parent = tempfile::tempdir().unwrap();
        let t = TransferContext::create(parent.path(), ResourceId::from("r"), None).unwrap();
        let paths = t.paths().clone();
        assert!(paths.partial.exists());

        t.write_chunk(&chunk(4, b"4567", None)).await.unwrap();
        assert!(!t.is_complete().await);
        assert_eq!(t.read_range(5..7).await.unwrap(), b"56");

        t.write_chunk(&chunk(0, b"0123", Some(8))).await.unwrap();
        assert!(t.is_complete().await);
        assert!(paths.complete.exists());
        assert!(!paths.partial.exists());
        assert_eq!(t.read_range(0..8).await.unwrap(), b"01234567");

        let meta: CoverageMeta = serde_json::from_slice(&std::fs::read(&paths.meta).unwrap()).unwrap();
        assert_eq!(meta.total_size, Some(8));
        assert_eq!(meta.ranges, vec![[0, 8]]);
    }

    #[tokio::test]
    async fn uncovered_read_fails() {
        let parent = tempfile::tempdir().unwrap();
        let t = TransferContext::create(parent.path(), ResourceId::from("r"), Some(10)).unwrap();
        t.write_chunk(&chunk(0, b"01", None)).await.unwrap();
        assert!(t.read_range(0..4).await.is_err());
    }

    #[tokio::test]
    async fn watch_sees_each_write() {
        let parent = tempfile::tempdir().unwrap();
        let t = TransferContext::create(parent.path(), ResourceId::from("r"), Some(4)).unwrap();
        let mut rx = t.subscribe();
        t.write_chunk(&chunk(0, b"01", None)).await.unwrap();
        let seen = rx.wait_for(|c| c.covers(&(0..2))).await.unwrap().clone();
        assert!(!seen.is_complete());
    }

    #[tokio::test]
    async fn chunk_past_total_is_clipped() {
        let parent = tempfile::tempdir().unwrap();
        let t = TransferContext::create(parent.path(), ResourceId::from("r"), Some(3)).unwrap();
        t.write_chunk(&chunk(0, b"012345", None)).await.unwrap();
        assert!(t.is_complete().await);
        assert_eq!(t.coverage().covered_bytes(), 3);
    }

    #[tokio::test]
    async fn release_runs_once() {
        let parent = tempfile::tempdir().unwrap();
        let t = TransferContext::create(parent.path(), ResourceId::from("r"), None).unwrap();
        let dir = t.paths().dir.clone();
        assert!(dir.exists());
        assert!(t.release());
        assert!(!dir.exists());
        assert!(!t.release());
        assert!(t.is_released());
    }
}
