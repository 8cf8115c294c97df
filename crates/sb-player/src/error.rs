//! Player error type.

use crate::state::PlaybackState;

/// Failures surfaced by a [`PlayerEngine`](crate::PlayerEngine).
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The action is not valid in the current playback state.
    #[error("cannot {action} while {state:?}")]
    InvalidState {
        state: PlaybackState,
        action: &'static str,
    },

    #[error("quality level {0}p is not available")]
    UnknownQuality(u32),

    #[error("invalid playback rate: {0}")]
    InvalidRate(f64),

    /// The decoder pipeline rejected an operation.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// The script host could not evaluate a command.
    #[error("script host error: {0}")]
    Script(String),

    /// A script message was not valid JSON or had an unknown shape.
    #[error("invalid script message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PlayerError>;
