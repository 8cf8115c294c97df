//! The engine contract shared by both adapters.

use async_trait::async_trait;
use sb_core::config::PlayerConfig;
use serde::{Deserialize, Serialize};

use crate::embedded::{EmbeddedEngine, ScriptHost};
use crate::error::Result;
use crate::events::EventReceiver;
use crate::native::{DecoderPipeline, NativeEngine};
use crate::state::{PlaybackState, PlayerStatus, VideoQuality, VideoQualityState};

/// Control surface a playback UI drives.
///
/// Implementations report asynchronously through the [`EventReceiver`]
/// returned at construction.
#[async_trait]
pub trait PlayerEngine: Send + Sync {
    /// Open the session's media.
    async fn load(&self) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn toggle_play_pause(&self) -> Result<()> {
        if self.state().is_active() {
            self.pause().await
        } else {
            self.play().await
        }
    }

    async fn seek(&self, secs: f64) -> Result<()>;

    /// Rate used whenever playback runs.
    async fn set_base_rate(&self, rate: f64) -> Result<()>;

    async fn set_video_quality(&self, quality: VideoQuality) -> Result<()>;

    /// Volume in `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    async fn set_muted(&self, muted: bool) -> Result<()>;

    /// `None` until the engine knows its levels.
    fn video_quality_state(&self) -> Option<VideoQualityState>;

    fn state(&self) -> PlaybackState;

    fn status(&self) -> PlayerStatus;
}

/// Which adapter plays a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    #[default]
    Native,
    Embedded,
}

/// Root URL of a session's address space, with a trailing slash.
pub fn session_url(base: &str, session_id: impl std::fmt::Display) -> String {
    format!("{}/{session_id}/", base.trim_end_matches('/'))
}

/// Build the engine `kind` selects for a session.
///
/// Only the factory for the selected kind is invoked.
pub fn select_engine<D, S>(
    kind: PlayerKind,
    session_url: &str,
    levels: Vec<u32>,
    duration: Option<f64>,
    config: &PlayerConfig,
    decoder: impl FnOnce() -> D,
    host: impl FnOnce() -> S,
) -> (Box<dyn PlayerEngine>, EventReceiver)
where
    D: DecoderPipeline,
    S: ScriptHost,
{
    tracing::debug!(?kind, session_url, "Selecting player engine");
    match kind {
        PlayerKind::Native => {
            let (engine, events) = NativeEngine::new(decoder(), session_url, levels, config);
            (Box::new(engine), events)
        }
        PlayerKind::Embedded => {
            let (engine, events) = EmbeddedEngine::new(host(), duration, config);
            (Box::new(engine), events)
        }
    }
}
