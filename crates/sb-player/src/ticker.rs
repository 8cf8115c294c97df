//! Periodic status reporting while playback is active.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::EventSender;

const MIN_PERIOD: Duration = Duration::from_millis(50);
const MAX_PERIOD: Duration = Duration::from_secs(2);
const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Report period at `rate`: the base interval shrinks as playback speeds up.
pub fn tick_period(base: Duration, rate: f64) -> Duration {
    let base = if base.is_zero() { DEFAULT_INTERVAL } else { base };
    if !rate.is_finite() || rate <= 0.0 {
        return base.clamp(MIN_PERIOD, MAX_PERIOD);
    }
    base.div_f64(rate.max(0.01)).clamp(MIN_PERIOD, MAX_PERIOD)
}

/// Owns at most one reporting task.
#[derive(Debug, Default)]
pub(crate) struct StatusTicker {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StatusTicker {
    /// Replace any running task with one calling `tick` every `period`.
    ///
    /// The task ends on its own once `tick` returns `false`.
    pub(crate) fn start<F>(&self, period: Duration, events: EventSender, mut tick: F)
    where
        F: FnMut(&EventSender) -> bool + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !tick(&events) {
                    break;
                }
            }
        });
        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for StatusTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
