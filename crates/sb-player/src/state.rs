//! Playback state machine and status snapshots.

use serde::{Deserialize, Serialize};

/// Where an engine is in its playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Buffering,
    Ended,
    Failed,
}

impl PlaybackState {
    /// Playing or stalled while trying to play.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Buffering)
    }

    /// Whether media is open, so seeks and quality changes apply.
    pub fn is_loaded(self) -> bool {
        matches!(
            self,
            Self::Ready | Self::Playing | Self::Paused | Self::Buffering | Self::Ended
        )
    }

    /// State after a load request, or `None` if one is already underway.
    pub fn on_load(self) -> Option<Self> {
        match self {
            Self::Loading => None,
            _ => Some(Self::Loading),
        }
    }

    /// State after `play()`.
    pub fn on_play(self) -> Option<Self> {
        match self {
            Self::Ready | Self::Paused | Self::Ended | Self::Playing => Some(Self::Playing),
            Self::Buffering => Some(Self::Buffering),
            Self::Idle | Self::Loading | Self::Failed => None,
        }
    }

    /// State after `pause()`.
    pub fn on_pause(self) -> Option<Self> {
        match self {
            Self::Ready | Self::Playing | Self::Paused | Self::Buffering => Some(Self::Paused),
            Self::Ended => Some(Self::Ended),
            Self::Idle | Self::Loading | Self::Failed => None,
        }
    }

    /// State after a seek: an ended stream becomes paused at the new position.
    pub fn on_seek(self) -> Option<Self> {
        match self {
            Self::Ended => Some(Self::Paused),
            s if s.is_loaded() => Some(s),
            _ => None,
        }
    }

    /// Apply a buffering report; only active states change.
    pub fn with_buffering(self, buffering: bool) -> Self {
        match (self, buffering) {
            (Self::Playing, true) => Self::Buffering,
            (Self::Buffering, false) => Self::Playing,
            (s, _) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingState {
    /// Nothing loaded yet.
    Unknown,
    Buffering,
    Ready,
}

/// One status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    /// Current position in seconds.
    pub timestamp: f64,
    pub duration: Option<f64>,
    /// Effective playback rate; 0 while not playing.
    pub rate: f64,
    pub buffering: BufferingState,
    pub state: PlaybackState,
}

/// A quality preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoQuality {
    #[default]
    Auto,
    Height(u32),
}

/// Quality information for UI reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoQualityState {
    /// Height currently rendered, when known.
    pub current: Option<u32>,
    pub preferred: VideoQuality,
    /// Ladder heights, highest first.
    pub available: Vec<u32>,
}

impl VideoQualityState {
    pub fn new(mut available: Vec<u32>) -> Self {
        available.sort_unstable_by(|a, b| b.cmp(a));
        available.dedup();
        Self {
            current: None,
            preferred: VideoQuality::Auto,
            available,
        }
    }

    pub fn supports(&self, quality: VideoQuality) -> bool {
        match quality {
            VideoQuality::Auto => true,
            VideoQuality::Height(h) => self.available.contains(&h),
        }
    }
}
