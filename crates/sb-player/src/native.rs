//! Engine over an external decoder pipeline.
//!
//! The decoder pulls HLS from the session's address space on its own; the
//! engine only tells it what to open and mirrors its progress into status
//! events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sb_core::config::PlayerConfig;
use sb_media::level_playlist_path;

use crate::engine::PlayerEngine;
use crate::error::{PlayerError, Result};
use crate::events::{event_channel, EventReceiver, EventSender, PlayerEvent};
use crate::state::{BufferingState, PlaybackState, PlayerStatus, VideoQuality, VideoQualityState};
use crate::ticker::{tick_period, StatusTicker};

const MASTER_MANIFEST: &str = "master.m3u8";

/// Boundary to a platform media decoder.
pub trait DecoderPipeline: Send + 'static {
    /// Open `url`, replacing whatever was open.
    fn open(&mut self, url: &str) -> Result<()>;
    fn start(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, secs: f64);
    fn set_rate(&mut self, rate: f64);
    fn set_volume(&mut self, volume: f32);
    fn position(&self) -> f64;
    fn duration(&self) -> Option<f64>;
    fn is_buffering(&self) -> bool;
}

#[derive(Debug)]
struct NativeState {
    playback: PlaybackState,
    rate: f64,
    volume: f32,
    muted: bool,
    quality: VideoQualityState,
}

pub struct NativeEngine<D> {
    session_url: String,
    decoder: Arc<Mutex<D>>,
    state: Arc<Mutex<NativeState>>,
    events: EventSender,
    ticker: StatusTicker,
    status_interval: Duration,
}

impl<D: DecoderPipeline> NativeEngine<D> {
    /// `session_url` is the session root, e.g. `http://127.0.0.1:8089/<id>/`.
    pub fn new(
        decoder: D,
        session_url: impl Into<String>,
        levels: Vec<u32>,
        config: &PlayerConfig,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let engine = Self {
            session_url: session_url.into(),
            decoder: Arc::new(Mutex::new(decoder)),
            state: Arc::new(Mutex::new(NativeState {
                playback: PlaybackState::Idle,
                rate: 1.0,
                volume: 1.0,
                muted: false,
                quality: VideoQualityState::new(levels),
            })),
            events,
            ticker: StatusTicker::default(),
            status_interval: Duration::from_millis(config.status_interval_ms),
        };
        (engine, receiver)
    }

    /// URL the decoder opens for `quality`.
    pub fn url_for(&self, quality: VideoQuality) -> String {
        let path = match quality {
            VideoQuality::Auto => MASTER_MANIFEST.to_owned(),
            VideoQuality::Height(h) => level_playlist_path(h),
        };
        format!("{}{path}", self.session_url)
    }

    pub fn is_reporting(&self) -> bool {
        self.ticker.is_running()
    }

    fn publish_status(&self) {
        let status = {
            let decoder = self.decoder.lock();
            let state = self.state.lock();
            snapshot(&*decoder, &state)
        };
        self.events.emit(PlayerEvent::Status(status));
    }

    fn start_ticker(&self, rate: f64) {
        let decoder = self.decoder.clone();
        let state = self.state.clone();
        let period = tick_period(self.status_interval, rate);
        self.ticker.start(period, self.events.clone(), move |events| {
            let decoder = decoder.lock();
            let mut state = state.lock();
            let previous = state.playback;
            state.playback = previous.with_buffering(decoder.is_buffering());

            // The decoder is still polled during a stall, but only the entry
            // into buffering is reported until playback resumes.
            if state.playback == PlaybackState::Buffering {
                if previous != PlaybackState::Buffering {
                    events.emit(PlayerEvent::Status(snapshot(&*decoder, &state)));
                }
                return true;
            }

            let position = decoder.position();
            let ended = decoder.duration().is_some_and(|d| position >= d);
            if ended {
                state.playback = PlaybackState::Ended;
            }
            events.emit(PlayerEvent::Time(position));
            events.emit(PlayerEvent::Status(snapshot(&*decoder, &state)));
            !ended
        });
    }

    fn fail(&self, error: PlayerError) -> PlayerError {
        tracing::warn!(session_url = %self.session_url, "Native playback failed: {error}");
        self.ticker.stop();
        self.state.lock().playback = PlaybackState::Failed;
        self.publish_status();
        error
    }
}

fn snapshot<D: DecoderPipeline>(decoder: &D, state: &NativeState) -> PlayerStatus {
    let buffering = match state.playback {
        PlaybackState::Idle | PlaybackState::Loading | PlaybackState::Failed => {
            BufferingState::Unknown
        }
        PlaybackState::Buffering => BufferingState::Buffering,
        _ => BufferingState::Ready,
    };
    PlayerStatus {
        timestamp: decoder.position(),
        duration: decoder.duration(),
        rate: if state.playback == PlaybackState::Playing {
            state.rate
        } else {
            0.0
        },
        buffering,
        state: state.playback,
    }
}

fn invalid(state: PlaybackState, action: &'static str) -> PlayerError {
    PlayerError::InvalidState { state, action }
}

#[async_trait]
impl<D: DecoderPipeline> PlayerEngine for NativeEngine<D> {
    async fn load(&self) -> Result<()> {
        let url = {
            let mut state = self.state.lock();
            let current = state.playback;
            state.playback = current.on_load().ok_or_else(|| invalid(current, "load"))?;
            let preferred = state.quality.preferred;
            state.quality.current = match preferred {
                VideoQuality::Height(h) => Some(h),
                VideoQuality::Auto => None,
            };
            self.url_for(preferred)
        };
        self.publish_status();

        let opened = self.decoder.lock().open(&url);
        if let Err(e) = opened {
            return Err(self.fail(e));
        }
        tracing::debug!(%url, "Native decoder opened");
        self.state.lock().playback = PlaybackState::Ready;
        self.publish_status();
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let rate = {
            let mut decoder = self.decoder.lock();
            let mut state = self.state.lock();
            let next = state
                .playback
                .on_play()
                .ok_or_else(|| invalid(state.playback, "play"))?;
            if state.playback == PlaybackState::Ended {
                decoder.seek(0.0);
            }
            decoder.set_rate(state.rate);
            decoder.start();
            state.playback = next;
            state.rate
        };
        self.start_ticker(rate);
        self.publish_status();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        {
            let mut decoder = self.decoder.lock();
            let mut state = self.state.lock();
            let next = state
                .playback
                .on_pause()
                .ok_or_else(|| invalid(state.playback, "pause"))?;
            decoder.pause();
            state.playback = next;
        }
        self.ticker.stop();
        self.publish_status();
        Ok(())
    }

    async fn seek(&self, secs: f64) -> Result<()> {
        let position = {
            let mut decoder = self.decoder.lock();
            let mut state = self.state.lock();
            let next = state
                .playback
                .on_seek()
                .ok_or_else(|| invalid(state.playback, "seek"))?;
            let mut target = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
            if let Some(duration) = decoder.duration() {
                target = target.min(duration);
            }
            decoder.seek(target);
            state.playback = next;
            target
        };
        self.events.emit(PlayerEvent::Time(position));
        self.publish_status();
        Ok(())
    }

    async fn set_base_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlayerError::InvalidRate(rate));
        }
        let active = {
            let mut decoder = self.decoder.lock();
            let mut state = self.state.lock();
            state.rate = rate;
            decoder.set_rate(rate);
            state.playback.is_active()
        };
        if active {
            self.start_ticker(rate);
        }
        self.publish_status();
        Ok(())
    }

    async fn set_video_quality(&self, quality: VideoQuality) -> Result<()> {
        let url = self.url_for(quality);
        {
            let mut decoder = self.decoder.lock();
            let mut state = self.state.lock();
            if let VideoQuality::Height(h) = quality {
                if !state.quality.supports(quality) {
                    return Err(PlayerError::UnknownQuality(h));
                }
            }
            state.quality.preferred = quality;
            if !state.playback.is_loaded() {
                return Ok(());
            }

            let position = decoder.position();
            if let Err(e) = decoder.open(&url) {
                drop(state);
                drop(decoder);
                return Err(self.fail(e));
            }
            decoder.seek(position);
            decoder.set_rate(state.rate);
            if state.playback.is_active() {
                decoder.start();
            }
            state.quality.current = match quality {
                VideoQuality::Height(h) => Some(h),
                VideoQuality::Auto => None,
            };
            tracing::debug!(%url, position, "Switched quality");
        }
        self.publish_status();
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        let mut decoder = self.decoder.lock();
        let mut state = self.state.lock();
        state.volume = volume;
        if !state.muted {
            decoder.set_volume(volume);
        }
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        let mut decoder = self.decoder.lock();
        let mut state = self.state.lock();
        state.muted = muted;
        decoder.set_volume(if muted { 0.0 } else { state.volume });
        Ok(())
    }

    fn video_quality_state(&self) -> Option<VideoQualityState> {
        let state = self.state.lock();
        (!state.quality.available.is_empty()).then(|| state.quality.clone())
    }

    fn state(&self) -> PlaybackState {
        self.state.lock().playback
    }

    fn status(&self) -> PlayerStatus {
        let decoder = self.decoder.lock();
        let state = self.state.lock();
        snapshot(&*decoder, &state)
    }
}

impl<D> Drop for NativeEngine<D> {
    fn drop(&mut self) {
        self.ticker.stop();
    }
}
