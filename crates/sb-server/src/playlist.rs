//! Per-session playlist fetching and rewriting.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sb_core::{MediaId, MediaVariant};
use sb_fetch::substrate::OPEN_END;
use sb_fetch::SegmentRangeServer;
use sb_media::rewrite_placeholders;
use tokio::sync::Notify;

/// Fetches playlist objects once per session and rewrites their tokens into
/// locally routable segment paths.
pub struct PlaylistRewriter {
    segments: Arc<SegmentRangeServer>,
    raw: DashMap<MediaId, Bytes>,
    loading: DashMap<MediaId, Arc<Notify>>,
}

/// Clears the loading marker and wakes waiters, even if the loader is
/// cancelled mid-fetch.
struct LoadingGuard<'a> {
    loading: &'a DashMap<MediaId, Arc<Notify>>,
    id: MediaId,
    notify: Arc<Notify>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.loading.remove(&self.id);
        self.notify.notify_waiters();
    }
}

impl PlaylistRewriter {
    pub fn new(segments: Arc<SegmentRangeServer>) -> Self {
        Self {
            segments,
            raw: DashMap::new(),
            loading: DashMap::new(),
        }
    }

    /// Rewritten text of `playlist`.
    ///
    /// Bytes that are not valid UTF-8 yield an empty playlist, which players
    /// treat as not ready yet.
    pub async fn rewrite(&self, playlist: &MediaVariant) -> String {
        let Some(bytes) = self.raw_bytes(playlist).await else {
            return String::new();
        };
        match std::str::from_utf8(&bytes) {
            Ok(text) => rewrite_placeholders(text),
            Err(e) => {
                tracing::warn!(media_id = %playlist.id, "Playlist is not valid UTF-8: {e}");
                String::new()
            }
        }
    }

    /// Whether the raw bytes of `id` are already cached.
    pub fn is_cached(&self, id: MediaId) -> bool {
        self.raw.contains_key(&id)
    }

    /// Raw playlist bytes, fetching them on first use.
    ///
    /// Concurrent callers for the same object share one fetch.
    async fn raw_bytes(&self, playlist: &MediaVariant) -> Option<Bytes> {
        if let Some(entry) = self.raw.get(&playlist.id) {
            return Some(entry.value().clone());
        }

        loop {
            match self.loading.entry(playlist.id) {
                Entry::Occupied(e) => {
                    let notify = e.get().clone();
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    // Register before releasing the shard lock so the
                    // loader's wakeup cannot be missed.
                    notified.as_mut().enable();
                    drop(e);
                    notified.await;

                    if let Some(entry) = self.raw.get(&playlist.id) {
                        return Some(entry.value().clone());
                    }
                    // Loader produced nothing; try loading ourselves.
                }
                Entry::Vacant(e) => {
                    let notify = Arc::new(Notify::new());
                    e.insert(notify.clone());
                    let _guard = LoadingGuard {
                        loading: &self.loading,
                        id: playlist.id,
                        notify,
                    };

                    let bytes = self.fetch(playlist).await?;
                    self.raw.insert(playlist.id, bytes.clone());
                    tracing::debug!(media_id = %playlist.id, size = bytes.len(), "Playlist cached");
                    return Some(bytes);
                }
            }
        }
    }

    async fn fetch(&self, playlist: &MediaVariant) -> Option<Bytes> {
        let resource = playlist.resource_ref();
        let end = resource.size.unwrap_or(OPEN_END);
        let mut request = self.segments.fetch_range(&resource, 0..end, resource.size);
        let chunk = request.wait().await?;

        match tokio::fs::read(chunk.path()).await {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) => {
                tracing::warn!(media_id = %playlist.id, "Failed to read playlist segment file: {e}");
                None
            }
        }
    }
}
