//! Directory-backed substrate: resource ids are paths relative to a root.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sb_core::{Error, ResourceId, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;

use crate::substrate::{deliver, FetchRequest, FetchSubstrate, FetchedChunk};

/// Serves resources from files under a root directory.
///
/// With `cached` set, every file counts as locally cached and
/// [`FetchSubstrate::cached_slice`] answers directly from disk.
#[derive(Debug, Clone)]
pub struct DirSubstrate {
    root: PathBuf,
    chunk_size: usize,
    cached: bool,
}

impl DirSubstrate {
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            root: root.into(),
            chunk_size: chunk_size.max(1),
            cached: true,
        }
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a resource id to a file under the root.
    ///
    /// Ids that are absolute or climb out of the root are rejected.
    pub fn resolve(&self, resource: &ResourceId) -> Option<PathBuf> {
        let relative = Path::new(resource.as_str());
        if resource.as_str().is_empty() {
            return None;
        }
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn read_slice(path: &Path, range: Range<u64>) -> std::io::Result<Option<Bytes>> {
        let mut file = std::fs::File::open(path)?;
        let len = file.metadata()?.len();
        let end = range.end.min(len);
        if range.start >= end {
            return Ok(None);
        }
        file.seek(SeekFrom::Start(range.start))?;
        let mut buf = vec![0u8; (end - range.start) as usize];
        file.read_exact(&mut buf)?;
        Ok(Some(Bytes::from(buf)))
    }
}

#[async_trait]
impl FetchSubstrate for DirSubstrate {
    fn cached_slice(&self, resource: &ResourceId, _size: Option<u64>, range: Range<u64>) -> Option<Bytes> {
        if !self.cached {
            return None;
        }
        let path = self.resolve(resource)?;
        match Self::read_slice(&path, range) {
            Ok(slice) => slice,
            Err(e) => {
                tracing::debug!(resource = %resource, "Cache lookup failed: {e}");
                None
            }
        }
    }

    async fn fetch(&self, request: FetchRequest, sink: mpsc::Sender<FetchedChunk>) -> Result<()> {
        let id = &request.resource.id;
        let path = self
            .resolve(id)
            .ok_or_else(|| Error::fetch(id, "resource id escapes the substrate root"))?;

        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Error::fetch(id, format!("open {}: {e}", path.display())))?;
        let total = file.metadata().await?.len();
        let end = request.range.end.min(total);
        let mut offset = request.range.start;

        if offset >= end {
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset)).await?;

        while offset < end {
            if request.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let want = (end - offset).min(self.chunk_size as u64) as usize;
            let mut buf = vec![0u8; want];
            file.read_exact(&mut buf).await?;

            let chunk = FetchedChunk {
                offset,
                data: Bytes::from(buf),
                total_size: Some(total),
            };
            offset += want as u64;
            if !deliver(&sink, &request.cancel, chunk).await {
                break;
            }
        }

        tracing::trace!(resource = %id, "Directory fetch finished at {offset}");
        Ok(())
    }
}
