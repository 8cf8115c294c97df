//! Status event channel shared by both engines.

use tokio::sync::mpsc;

use crate::state::PlayerStatus;

const EVENT_CAPACITY: usize = 64;

/// Something a consumer should know about playback.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Status(PlayerStatus),
    /// Current position in seconds.
    Time(f64),
}

/// Create a bounded event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
    (EventSender { tx }, EventReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PlayerEvent>,
}

impl EventSender {
    /// Queue `event` without waiting.
    ///
    /// Events are dropped when the consumer lags behind; the next report
    /// supersedes them anyway.
    pub fn emit(&self, event: PlayerEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::trace!("Player event dropped: {e}");
        }
    }
}

#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<PlayerEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<PlayerEvent> {
        self.rx.recv().await
    }

    /// Every event queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// The most recent status among the queued events.
    pub fn latest_status(&mut self) -> Option<PlayerStatus> {
        self.drain().into_iter().rev().find_map(|e| match e {
            PlayerEvent::Status(s) => Some(s),
            PlayerEvent::Time(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BufferingState, PlaybackState};

    fn status(timestamp: f64) -> PlayerStatus {
        PlayerStatus {
            timestamp,
            duration: None,
            rate: 1.0,
            buffering: BufferingState::Ready,
            state: PlaybackState::Playing,
        }
    }

    #[tokio::test]
    async fn drain_returns_queued_events_in_order() {
        let (tx, mut rx) = event_channel();
        tx.emit(PlayerEvent::Time(1.0));
        tx.emit(PlayerEvent::Status(status(1.0)));
        assert_eq!(
            rx.drain(),
            vec![PlayerEvent::Time(1.0), PlayerEvent::Status(status(1.0))]
        );
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = event_channel();
        for i in 0..(EVENT_CAPACITY + 10) {
            tx.emit(PlayerEvent::Time(i as f64));
        }
        assert_eq!(rx.drain().len(), EVENT_CAPACITY);
    }

    #[tokio::test]
    async fn latest_status_skips_time_events() {
        let (tx, mut rx) = event_channel();
        tx.emit(PlayerEvent::Status(status(1.0)));
        tx.emit(PlayerEvent::Status(status(2.0)));
        tx.emit(PlayerEvent::Time(3.0));
        assert_eq!(rx.latest_status(), Some(status(2.0)));
    }
}
