//! Engine over the page script running in an embedded web renderer.
//!
//! The host drives the page by evaluating `player*` calls and learns what
//! happened from the JSON messages the page posts back. Playback state is
//! whatever the page last reported.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sb_core::config::PlayerConfig;
use serde::Deserialize;

use crate::engine::PlayerEngine;
use crate::error::{PlayerError, Result};
use crate::events::{event_channel, EventReceiver, EventSender, PlayerEvent};
use crate::state::{BufferingState, PlaybackState, PlayerStatus, VideoQuality, VideoQualityState};
use crate::ticker::{tick_period, StatusTicker};

/// Positions this close to the duration count as the end.
const END_TOLERANCE_SECS: f64 = 0.25;

/// Level index that lets the page script choose.
const AUTO_LEVEL: i32 = -1;

/// Evaluates script in the renderer.
pub trait ScriptHost: Send + Sync + 'static {
    fn evaluate(&self, script: &str) -> Result<()>;
}

/// Host to page calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptCommand {
    Load { level: i32 },
    Play,
    Pause,
    Seek(f64),
    SetBaseRate(f64),
    /// `-1` selects automatic switching.
    SetLevel(i32),
    SetIsMuted(bool),
}

impl ScriptCommand {
    /// The call as JavaScript source.
    pub fn to_js(&self) -> String {
        match self {
            Self::Load { level } => format!("playerLoad({level})"),
            Self::Play => "playerPlay()".to_owned(),
            Self::Pause => "playerPause()".to_owned(),
            Self::Seek(secs) => format!("playerSeek({secs})"),
            Self::SetBaseRate(rate) => format!("playerSetBaseRate({rate})"),
            Self::SetLevel(level) => format!("playerSetLevel({level})"),
            Self::SetIsMuted(muted) => format!("playerSetIsMuted({muted})"),
        }
    }
}

/// Page to host messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ScriptMessage {
    PlayerStatus(ScriptStatus),
    PlayerCurrentTime { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStatus {
    pub is_ready: bool,
    pub is_first_frame_ready: bool,
    pub is_playing: bool,
    pub rate: f64,
    pub default_rate: f64,
    #[serde(default)]
    pub levels: Vec<ScriptLevel>,
    pub current_level: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptLevel {
    pub index: i32,
    #[serde(default)]
    pub bitrate: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug)]
struct EmbeddedState {
    playback: PlaybackState,
    timestamp: f64,
    rate: f64,
    volume: f32,
    muted: bool,
    levels: Vec<ScriptLevel>,
    quality: VideoQualityState,
}

impl EmbeddedState {
    fn level_index(&self, height: u32) -> Option<i32> {
        self.levels.iter().find(|l| l.height == height).map(|l| l.index)
    }

    fn level_for(&self, quality: VideoQuality) -> Option<i32> {
        match quality {
            VideoQuality::Auto => Some(AUTO_LEVEL),
            VideoQuality::Height(h) => self.level_index(h),
        }
    }
}

pub struct EmbeddedEngine<S> {
    host: S,
    duration: Option<f64>,
    state: Arc<Mutex<EmbeddedState>>,
    events: EventSender,
    ticker: StatusTicker,
    status_interval: Duration,
}

impl<S: ScriptHost> EmbeddedEngine<S> {
    /// `duration` comes from the media object; the page does not report it.
    pub fn new(host: S, duration: Option<f64>, config: &PlayerConfig) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let engine = Self {
            host,
            duration,
            state: Arc::new(Mutex::new(EmbeddedState {
                playback: PlaybackState::Idle,
                timestamp: 0.0,
                rate: 1.0,
                volume: 1.0,
                muted: false,
                levels: Vec::new(),
                quality: VideoQualityState::new(Vec::new()),
            })),
            events,
            ticker: StatusTicker::default(),
            status_interval: Duration::from_millis(config.status_interval_ms),
        };
        (engine, receiver)
    }

    pub fn host(&self) -> &S {
        &self.host
    }

    pub fn is_reporting(&self) -> bool {
        self.ticker.is_running()
    }

    fn send(&self, command: ScriptCommand) -> Result<()> {
        let script = command.to_js();
        tracing::trace!(%script, "Evaluating player command");
        self.host.evaluate(&script)
    }

    /// Apply a JSON message posted by the page.
    pub fn handle_message(&self, json: &str) -> Result<()> {
        let message: ScriptMessage = serde_json::from_str(json)?;
        self.apply(message)
    }

    pub fn apply(&self, message: ScriptMessage) -> Result<()> {
        match message {
            ScriptMessage::PlayerCurrentTime { value } => {
                self.state.lock().timestamp = value;
                self.events.emit(PlayerEvent::Time(value));
                Ok(())
            }
            ScriptMessage::PlayerStatus(status) => self.apply_status(status),
        }
    }

    fn apply_status(&self, status: ScriptStatus) -> Result<()> {
        let (playing, rate, rate_changed, pending_level) = {
            let mut state = self.state.lock();
            let had_levels = !state.levels.is_empty();
            if !status.levels.is_empty() {
                let preferred = state.quality.preferred;
                state.quality = VideoQualityState::new(
                    status.levels.iter().map(|l| l.height).filter(|&h| h > 0).collect(),
                );
                state.quality.preferred = preferred;
                state.levels = status.levels.clone();
            }
            state.quality.current = state
                .levels
                .iter()
                .find(|l| l.index == status.current_level)
                .map(|l| l.height);

            state.playback = self.next_state(state.playback, state.timestamp, &status);
            let rate_changed = state.rate != status.rate && status.rate > 0.0;
            if status.rate > 0.0 {
                state.rate = status.rate;
            }

            // A preference set before the page knew its levels.
            let pending_level = match state.quality.preferred {
                VideoQuality::Height(h) if !had_levels && !state.levels.is_empty() => {
                    state.level_index(h)
                }
                _ => None,
            };
            (state.playback == PlaybackState::Playing, state.rate, rate_changed, pending_level)
        };

        // Stalls stop the ticker; the page reports when playback resumes.
        if playing {
            if rate_changed || !self.ticker.is_running() {
                self.start_ticker(rate);
            }
        } else {
            self.ticker.stop();
        }
        self.publish_status();

        if let Some(level) = pending_level {
            self.send(ScriptCommand::SetLevel(level))?;
        }
        Ok(())
    }

    fn next_state(&self, current: PlaybackState, timestamp: f64, status: &ScriptStatus) -> PlaybackState {
        let presentable = status.is_ready && status.is_first_frame_ready;
        if status.is_playing {
            return if presentable {
                PlaybackState::Playing
            } else {
                PlaybackState::Buffering
            };
        }
        if self
            .duration
            .is_some_and(|d| d > 0.0 && timestamp >= d - END_TOLERANCE_SECS)
        {
            return PlaybackState::Ended;
        }
        match current {
            PlaybackState::Idle | PlaybackState::Loading if !status.is_ready => PlaybackState::Loading,
            PlaybackState::Idle | PlaybackState::Loading | PlaybackState::Ready => PlaybackState::Ready,
            _ => PlaybackState::Paused,
        }
    }

    fn start_ticker(&self, rate: f64) {
        let state = self.state.clone();
        let duration = self.duration;
        let period = tick_period(self.status_interval, rate);
        self.ticker.start(period, self.events.clone(), move |events| {
            let state = state.lock();
            events.emit(PlayerEvent::Status(snapshot(&state, duration)));
            state.playback == PlaybackState::Playing
        });
    }

    fn publish_status(&self) {
        let status = snapshot(&self.state.lock(), self.duration);
        self.events.emit(PlayerEvent::Status(status));
    }

    fn require_loaded(&self, action: &'static str) -> Result<()> {
        let current = self.state.lock().playback;
        if current.is_loaded() {
            Ok(())
        } else {
            Err(PlayerError::InvalidState {
                state: current,
                action,
            })
        }
    }
}

fn snapshot(state: &EmbeddedState, duration: Option<f64>) -> PlayerStatus {
    let buffering = match state.playback {
        PlaybackState::Idle | PlaybackState::Failed => BufferingState::Unknown,
        PlaybackState::Loading | PlaybackState::Buffering => BufferingState::Buffering,
        _ => BufferingState::Ready,
    };
    PlayerStatus {
        timestamp: state.timestamp,
        duration,
        rate: if state.playback == PlaybackState::Playing {
            state.rate
        } else {
            0.0
        },
        buffering,
        state: state.playback,
    }
}

#[async_trait]
impl<S: ScriptHost> PlayerEngine for EmbeddedEngine<S> {
    async fn load(&self) -> Result<()> {
        let level = {
            let mut state = self.state.lock();
            let current = state.playback;
            state.playback = current.on_load().ok_or(PlayerError::InvalidState {
                state: current,
                action: "load",
            })?;
            state.timestamp = 0.0;
            state.level_for(state.quality.preferred).unwrap_or(AUTO_LEVEL)
        };
        self.publish_status();
        if let Err(e) = self.send(ScriptCommand::Load { level }) {
            tracing::warn!("Embedded player failed to load: {e}");
            self.state.lock().playback = PlaybackState::Failed;
            self.publish_status();
            return Err(e);
        }
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.require_loaded("play")?;
        self.send(ScriptCommand::Play)
    }

    async fn pause(&self) -> Result<()> {
        self.require_loaded("pause")?;
        self.send(ScriptCommand::Pause)
    }

    async fn seek(&self, secs: f64) -> Result<()> {
        self.require_loaded("seek")?;
        let mut target = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        if let Some(duration) = self.duration {
            target = target.min(duration);
        }
        self.send(ScriptCommand::Seek(target))
    }

    async fn set_base_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlayerError::InvalidRate(rate));
        }
        self.send(ScriptCommand::SetBaseRate(rate))
    }

    async fn set_video_quality(&self, quality: VideoQuality) -> Result<()> {
        let level = {
            let mut state = self.state.lock();
            if state.levels.is_empty() {
                // Applied once the page reports its levels.
                state.quality.preferred = quality;
                return Ok(());
            }
            let level = match state.level_for(quality) {
                Some(level) => level,
                None => {
                    let VideoQuality::Height(h) = quality else {
                        return Ok(());
                    };
                    return Err(PlayerError::UnknownQuality(h));
                }
            };
            state.quality.preferred = quality;
            level
        };
        self.send(ScriptCommand::SetLevel(level))
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        let muted = {
            let mut state = self.state.lock();
            state.volume = volume.clamp(0.0, 1.0);
            state.muted || state.volume == 0.0
        };
        self.send(ScriptCommand::SetIsMuted(muted))
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.state.lock().muted = muted;
        self.send(ScriptCommand::SetIsMuted(muted))
    }

    fn video_quality_state(&self) -> Option<VideoQualityState> {
        let state = self.state.lock();
        (!state.quality.available.is_empty()).then(|| state.quality.clone())
    }

    fn state(&self) -> PlaybackState {
        self.state.lock().playback
    }

    fn status(&self) -> PlayerStatus {
        snapshot(&self.state.lock(), self.duration)
    }
}

impl<S> Drop for EmbeddedEngine<S> {
    fn drop(&mut self) {
        self.ticker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Default)]
    struct RecordingHost {
        scripts: Mutex<Vec<String>>,
    }

    impl ScriptHost for RecordingHost {
        fn evaluate(&self, script: &str) -> Result<()> {
            self.scripts.lock().push(script.to_owned());
            Ok(())
        }
    }

    fn engine() -> (EmbeddedEngine<RecordingHost>, EventReceiver) {
        EmbeddedEngine::new(RecordingHost::default(), Some(30.0), &PlayerConfig::default())
    }

    fn scripts(engine: &EmbeddedEngine<RecordingHost>) -> Vec<String> {
        engine.host().scripts.lock().clone()
    }

    const READY: &str = r#"{"event":"playerStatus","data":{"isReady":true,"isFirstFrameReady":true,
        "isPlaying":false,"rate":1,"defaultRate":1,
        "levels":[{"index":0,"bitrate":800000,"width":854,"height":480},
                  {"index":1,"bitrate":3200000,"width":1920,"height":1080}],
        "currentLevel":1}}"#;

    const PLAYING: &str = r#"{"event":"playerStatus","data":{"isReady":true,"isFirstFrameReady":true,
        "isPlaying":true,"rate":1,"defaultRate":1,
        "levels":[{"index":0,"bitrate":800000,"width":854,"height":480},
                  {"index":1,"bitrate":3200000,"width":1920,"height":1080}],
        "currentLevel":0}}"#;

    #[test]
    fn commands_render_as_calls() {
        assert_eq!(ScriptCommand::Load { level: -1 }.to_js(), "playerLoad(-1)");
        assert_eq!(ScriptCommand::Play.to_js(), "playerPlay()");
        assert_eq!(ScriptCommand::Pause.to_js(), "playerPause()");
        assert_eq!(ScriptCommand::Seek(12.5).to_js(), "playerSeek(12.5)");
        assert_eq!(ScriptCommand::SetBaseRate(2.0).to_js(), "playerSetBaseRate(2)");
        assert_eq!(ScriptCommand::SetLevel(-1).to_js(), "playerSetLevel(-1)");
        assert_eq!(ScriptCommand::SetIsMuted(true).to_js(), "playerSetIsMuted(true)");
    }

    #[test]
    fn messages_parse() {
        assert_eq!(
            serde_json::from_str::<ScriptMessage>(
                r#"{"event":"playerCurrentTime","data":{"value":4.2}}"#
            )
            .unwrap(),
            ScriptMessage::PlayerCurrentTime { value: 4.2 }
        );
        assert_matches!(
            serde_json::from_str::<ScriptMessage>(READY).unwrap(),
            ScriptMessage::PlayerStatus(ScriptStatus { levels, current_level: 1, .. }) if levels.len() == 2
        );
    }

    #[tokio::test]
    async fn unknown_message_is_an_error() {
        let (engine, _events) = engine();
        assert_matches!(
            engine.handle_message(r#"{"event":"playerExploded","data":{}}"#),
            Err(PlayerError::InvalidMessage(_))
        );
        assert_matches!(engine.handle_message("not json"), Err(PlayerError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn load_then_status_reaches_ready() {
        let (engine, mut events) = engine();
        engine.load().await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Loading);
        assert_eq!(scripts(&engine), vec!["playerLoad(-1)"]);

        engine.handle_message(READY).unwrap();
        assert_eq!(engine.state(), PlaybackState::Ready);
        let quality = engine.video_quality_state().unwrap();
        assert_eq!(quality.available, vec![1080, 480]);
        assert_eq!(quality.current, Some(1080));
        assert_eq!(
            events.latest_status().map(|s| s.state),
            Some(PlaybackState::Ready)
        );
    }

    #[tokio::test]
    async fn commands_require_load() {
        let (engine, _events) = engine();
        assert_matches!(engine.play().await, Err(PlayerError::InvalidState { .. }));
        assert!(scripts(&engine).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn playing_status_starts_ticker_and_pause_stops_it() {
        let (engine, mut events) = engine();
        engine.load().await.unwrap();
        engine.handle_message(READY).unwrap();
        engine.play().await.unwrap();
        assert_eq!(scripts(&engine).last().map(String::as_str), Some("playerPlay()"));
        assert!(!engine.is_reporting());

        engine.handle_message(PLAYING).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.is_reporting());
        events.drain();

        engine
            .handle_message(r#"{"event":"playerCurrentTime","data":{"value":3.5}}"#)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        let drained = events.drain();
        assert_eq!(drained[0], PlayerEvent::Time(3.5));
        let ticks = drained
            .iter()
            .filter(|e| matches!(e, PlayerEvent::Status(s) if s.timestamp == 3.5))
            .count();
        assert_eq!(ticks, 2);

        engine.pause().await.unwrap();
        engine.handle_message(READY).unwrap();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(!engine.is_reporting());
    }

    #[tokio::test]
    async fn stalled_playback_is_buffering() {
        let (engine, _events) = engine();
        engine.load().await.unwrap();
        engine
            .handle_message(&PLAYING.replace("\"isFirstFrameReady\":true", "\"isFirstFrameReady\":false"))
            .unwrap();
        assert_eq!(engine.state(), PlaybackState::Buffering);
        assert_eq!(engine.status().buffering, BufferingState::Buffering);
    }

    #[tokio::test(start_paused = true)]
    async fn stall_stops_ticker_until_playback_resumes() {
        let (engine, mut events) = engine();
        engine.load().await.unwrap();
        engine.handle_message(PLAYING).unwrap();
        assert!(engine.is_reporting());

        engine
            .handle_message(&PLAYING.replace("\"isFirstFrameReady\":true", "\"isFirstFrameReady\":false"))
            .unwrap();
        assert!(!engine.is_reporting());
        events.drain();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(events.drain().is_empty());

        engine.handle_message(PLAYING).unwrap();
        assert!(engine.is_reporting());
        let resumed = events.drain();
        assert_eq!(resumed.len(), 1);
        assert_matches!(
            &resumed[0],
            PlayerEvent::Status(s) if s.state == PlaybackState::Playing
                && s.buffering == BufferingState::Ready
        );
    }

    #[tokio::test]
    async fn reaching_duration_ends() {
        let (engine, _events) = engine();
        engine.load().await.unwrap();
        engine.handle_message(PLAYING).unwrap();
        engine
            .handle_message(r#"{"event":"playerCurrentTime","data":{"value":30.0}}"#)
            .unwrap();
        engine.handle_message(READY).unwrap();
        assert_eq!(engine.state(), PlaybackState::Ended);
    }

    #[tokio::test]
    async fn quality_maps_height_to_level_index() {
        let (engine, _events) = engine();
        engine.load().await.unwrap();
        engine.handle_message(READY).unwrap();

        engine
            .set_video_quality(VideoQuality::Height(480))
            .await
            .unwrap();
        engine.set_video_quality(VideoQuality::Auto).await.unwrap();
        assert_matches!(
            engine.set_video_quality(VideoQuality::Height(720)).await,
            Err(PlayerError::UnknownQuality(720))
        );
        assert_eq!(
            scripts(&engine)[1..],
            ["playerSetLevel(0)", "playerSetLevel(-1)"]
        );
    }

    #[tokio::test]
    async fn early_quality_preference_applies_with_first_levels() {
        let (engine, _events) = engine();
        engine
            .set_video_quality(VideoQuality::Height(480))
            .await
            .unwrap();
        engine.load().await.unwrap();
        engine.handle_message(READY).unwrap();
        assert_eq!(scripts(&engine), vec!["playerLoad(-1)", "playerSetLevel(0)"]);
        assert_eq!(
            engine.video_quality_state().unwrap().preferred,
            VideoQuality::Height(480)
        );
    }

    #[tokio::test]
    async fn mute_and_rate_commands() {
        let (engine, _events) = engine();
        engine.set_muted(true).await.unwrap();
        engine.set_volume(0.5).await.unwrap();
        engine.set_muted(false).await.unwrap();
        engine.set_volume(0.0).await.unwrap();
        engine.set_base_rate(1.5).await.unwrap();
        assert_matches!(engine.set_base_rate(-1.0).await, Err(PlayerError::InvalidRate(_)));
        assert_eq!(
            scripts(&engine),
            vec![
                "playerSetIsMuted(true)",
                "playerSetIsMuted(true)",
                "playerSetIsMuted(false)",
                "playerSetIsMuted(true)",
                "playerSetBaseRate(1.5)",
            ]
        );
    }
}
