//! Session registry.
//!
//! Tracks live bridge sessions with automatic cleanup of idle ones. Each
//! session owns a [`StreamingSource`]; removing the session shuts it down,
//! which cancels its fetches and deletes its transfer files.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sb_core::config::Config;
use sb_core::{MediaId, MediaObject, SessionId};
use sb_fetch::FetchSubstrate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::assets::AssetTable;
use crate::source::StreamingSource;

struct SessionEntry {
    source: Arc<StreamingSource>,
    started_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// Snapshot of a session for listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub media_id: MediaId,
    /// Ladder heights, highest first.
    pub levels: Vec<u32>,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Thread-safe registry of bridge sessions keyed by [`SessionId`].
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionEntry>>,
    substrate: Arc<dyn FetchSubstrate>,
    assets: Arc<AssetTable>,
    config: Arc<Config>,
    /// Idle time after which a session is considered expired.
    expiry_duration: Duration,
}

impl SessionRegistry {
    pub fn new(config: Arc<Config>, substrate: Arc<dyn FetchSubstrate>, assets: Arc<AssetTable>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            substrate,
            assets,
            expiry_duration: Duration::from_secs(config.bridge.session_expiry_secs),
            config,
        }
    }

    /// Build a streaming source for `media` and bind it to a new session.
    pub fn register(&self, media: MediaObject) -> sb_core::Result<SessionId> {
        let session_id = SessionId::new();
        let media_id = media.id;
        let source = StreamingSource::new(session_id, media, self.substrate.clone(), &self.config)?
            .with_assets(self.assets.clone());
        let levels = source.ladder().heights();

        let now = Utc::now();
        self.sessions.insert(
            session_id,
            SessionEntry {
                source: Arc::new(source),
                started_at: now,
                last_seen: now,
            },
        );
        tracing::info!(
            session_id = %session_id,
            media_id = %media_id,
            levels = ?levels,
            "Registered bridge session"
        );

        Ok(session_id)
    }

    /// Look up a session's source, marking the session as active.
    pub fn get(&self, session_id: &SessionId) -> Option<Arc<StreamingSource>> {
        let mut entry = self.sessions.get_mut(session_id)?;
        entry.last_seen = Utc::now();
        Some(entry.source.clone())
    }

    /// Remove a session and shut its source down.
    ///
    /// Returns `false` if the session did not exist.
    pub fn unregister(&self, session_id: &SessionId) -> bool {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            return false;
        };
        entry.source.shutdown();
        tracing::info!(
            session_id = %session_id,
            duration_secs = (Utc::now() - entry.started_at).num_seconds(),
            "Ended bridge session"
        );
        true
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo {
                session_id: *entry.key(),
                media_id: entry.source.media().id,
                levels: entry.source.ladder().heights(),
                started_at: entry.started_at,
                last_seen: entry.last_seen,
            })
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Remove sessions idle for longer than the expiry duration.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let expiry = chrono::Duration::from_std(self.expiry_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));

        let mut removed_count = 0;
        self.sessions.retain(|session_id, entry| {
            let idle = now - entry.last_seen;
            if idle > expiry {
                entry.source.shutdown();
                tracing::info!(
                    session_id = %session_id,
                    inactive_secs = idle.num_seconds(),
                    "Expired session removed"
                );
                removed_count += 1;
                false
            } else {
                true
            }
        });

        if removed_count > 0 {
            tracing::debug!(removed = removed_count, "Cleaned up expired sessions");
        }

        removed_count
    }

    /// Shut down and remove every session.
    pub fn shutdown_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.unregister(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Start a background task that periodically removes expired sessions.
///
/// The task stops when `cancel` fires.
pub fn start_cleanup_task(
    registry: SessionRegistry,
    interval_secs: u64,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    registry.cleanup_expired();
                }
                _ = cancel.cancelled() => break,
            }
        }
        tracing::debug!("Session cleanup task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sb_core::{AlternativeRepresentation, MediaVariant, ResourceId, VideoCodec};
    use sb_fetch::DirSubstrate;

    fn media(with_playlist: bool) -> MediaObject {
        let mut alternatives = vec![AlternativeRepresentation::Video {
            object: MediaVariant {
                id: MediaId(10),
                resource: ResourceId::from("v.mp4"),
                size: Some(100),
                duration_secs: Some(1.0),
            },
            width: 1280,
            height: 720,
            codec: VideoCodec::H264,
        }];
        if with_playlist {
            alternatives.push(AlternativeRepresentation::Playlist {
                object: MediaVariant {
                    id: MediaId(20),
                    resource: ResourceId::from("p.m3u8"),
                    size: None,
                    duration_secs: None,
                },
                mime_type: "application/x-mpegurl".into(),
                reference: "reference-marker:10".into(),
            });
        }
        MediaObject {
            id: MediaId(1),
            resource: ResourceId::from("base"),
            size: None,
            duration_secs: None,
            alternatives,
        }
    }

    fn registry(expiry_secs: u64) -> (tempfile::TempDir, SessionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.bridge.session_expiry_secs = expiry_secs;
        config.bridge.temp_dir = Some(dir.path().to_path_buf());
        let substrate = Arc::new(DirSubstrate::new(dir.path(), 64));
        let registry = SessionRegistry::new(Arc::new(config), substrate, Arc::new(AssetTable::builtin()));
        (dir, registry)
    }

    #[test]
    fn register_get_unregister() {
        let (_dir, reg) = registry(600);
        let id = reg.register(media(true)).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&id).unwrap().session_id(), id);

        let listed = reg.list();
        assert_eq!(listed[0].levels, vec![720]);

        assert!(reg.unregister(&id));
        assert!(!reg.unregister(&id));
        assert!(reg.get(&id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn incomplete_ladder_is_ladder_error() {
        let (_dir, reg) = registry(600);
        let err = reg.register(media(false)).unwrap_err();
        assert_matches!(err, sb_core::Error::Ladder(_));
        assert_eq!(err.http_status(), 422);
        assert!(reg.is_empty());
    }

    #[test]
    fn cleanup_removes_only_idle_sessions() {
        let (_dir, reg) = registry(0);
        let id = reg.register(media(true)).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(reg.cleanup_expired(), 1);
        assert!(reg.get(&id).is_none());

        let (_dir, reg) = registry(600);
        reg.register(media(true)).unwrap();
        assert_eq!(reg.cleanup_expired(), 0);
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_task_stops_on_cancel() {
        let (_dir, reg) = registry(600);
        let cancel = CancellationToken::new();
        let handle = start_cleanup_task(reg, 1, cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
