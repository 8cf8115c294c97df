//! sb-player: playback engines over a bridge session.
//!
//! Both engines implement [`PlayerEngine`] and report through the same
//! [`PlayerEvent`] stream, so consumers do not care which one is driving
//! playback.
//!
//! # Modules
//!
//! - [`state`] - Playback state machine and status snapshots
//! - [`events`] - Status event channel
//! - [`engine`] - The shared engine trait and engine selection
//! - [`native`] - Engine over an external decoder pipeline
//! - [`embedded`] - Engine over a page script in an embedded renderer

pub mod embedded;
pub mod engine;
pub mod error;
pub mod events;
pub mod native;
pub mod state;
mod ticker;

pub use embedded::{EmbeddedEngine, ScriptCommand, ScriptHost, ScriptMessage};
pub use engine::{select_engine, session_url, PlayerEngine, PlayerKind};
pub use error::{PlayerError, Result};
pub use events::{event_channel, EventReceiver, EventSender, PlayerEvent};
pub use native::{DecoderPipeline, NativeEngine};
pub use state::{BufferingState, PlaybackState, PlayerStatus, VideoQuality, VideoQualityState};
pub use ticker::tick_period;
