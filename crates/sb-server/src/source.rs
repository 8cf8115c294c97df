//! The streaming source behind one session's address space.

use std::ops::Range;
use std::sync::Arc;

use sb_core::config::Config;
use sb_core::{MediaId, MediaObject, SessionId};
use sb_fetch::{FetchSubstrate, SegmentRangeServer, SegmentRequest, SegmentSettings};
use sb_media::{generate_master_playlist, LadderError, MasterPlaylist, QualityLadder};

use crate::assets::{AssetTable, StaticAsset};
use crate::playlist::PlaylistRewriter;

/// Serves the static page, the master manifest, per-level playlists and
/// segment bytes for one media object.
pub struct StreamingSource {
    session_id: SessionId,
    media: MediaObject,
    ladder: QualityLadder,
    master: String,
    assets: Arc<AssetTable>,
    segments: Arc<SegmentRangeServer>,
    playlists: PlaylistRewriter,
}

impl StreamingSource {
    /// Resolve the ladder and set up the session's fetch machinery.
    ///
    /// Fails when the media object has no usable ladder; nothing is fetched
    /// in that case.
    pub fn new(
        session_id: SessionId,
        media: MediaObject,
        substrate: Arc<dyn FetchSubstrate>,
        config: &Config,
    ) -> Result<Self, LadderError> {
        let ladder = QualityLadder::build(&media)?;
        let master = generate_master_playlist(&MasterPlaylist::from_ladder(
            &ladder,
            media.duration_secs,
            config.bridge.default_bandwidth,
        ));

        let segments = Arc::new(SegmentRangeServer::new(
            substrate,
            SegmentSettings::from_config(&config.bridge),
        ));
        let playlists = PlaylistRewriter::new(segments.clone());

        tracing::debug!(
            session_id = %session_id,
            media_id = %media.id,
            heights = ?ladder.heights(),
            "Streaming source ready"
        );

        Ok(Self {
            session_id,
            media,
            ladder,
            master,
            assets: Arc::new(AssetTable::builtin()),
            segments,
            playlists,
        })
    }

    /// Serve assets from a shared table instead of the built-ins.
    pub fn with_assets(mut self, assets: Arc<AssetTable>) -> Self {
        self.assets = assets;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn media(&self) -> &MediaObject {
        &self.media
    }

    pub fn ladder(&self) -> &QualityLadder {
        &self.ladder
    }

    pub fn static_asset(&self, path: &str) -> Option<StaticAsset> {
        self.assets.get(path).cloned()
    }

    pub fn master_manifest(&self) -> String {
        self.master.clone()
    }

    /// Rewritten media playlist for `height`, or `None` if the ladder has no
    /// such level.
    pub async fn quality_playlist(&self, height: u32) -> Option<String> {
        let level = self.ladder.level(height)?;
        Some(self.playlists.rewrite(&level.playlist).await)
    }

    /// Byte range of the segment object `id`.
    ///
    /// `None` if `id` is not one of the ladder's variants.
    pub fn segment_bytes(&self, id: MediaId, range: Range<u64>) -> Option<SegmentRequest> {
        let level = self.ladder.level_by_variant(id)?;
        let resource = level.variant.resource_ref();
        Some(self.segments.fetch_range(&resource, range, resource.size))
    }

    /// Size of the segment object `id`, when known up front.
    pub fn segment_size(&self, id: MediaId) -> Option<u64> {
        self.ladder.level_by_variant(id)?.variant.size
    }

    pub fn has_segment(&self, id: MediaId) -> bool {
        self.ladder.level_by_variant(id).is_some()
    }

    /// Cancel every live fetch of this session.
    pub fn shutdown(&self) {
        self.segments.shutdown();
        tracing::debug!(session_id = %self.session_id, "Streaming source shut down");
    }

    pub fn active_fetches(&self) -> usize {
        self.segments.active_contexts()
    }
}

impl std::fmt::Debug for StreamingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSource")
            .field("session_id", &self.session_id)
            .field("media_id", &self.media.id)
            .field("heights", &self.ladder.heights())
            .finish_non_exhaustive()
    }
}
