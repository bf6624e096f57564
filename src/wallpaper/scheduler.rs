//! Periodic refresh of the wallpaper.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateInterval {
    #[default]
    #[serde(rename = "manual")]
    #[value(name = "manual")]
    Manual,
    #[serde(rename = "30min")]
    #[value(name = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1hour")]
    #[value(name = "1hour")]
    OneHour,
    #[serde(rename = "6hour")]
    #[value(name = "6hour")]
    SixHours,
    #[serde(rename = "daily")]
    #[value(name = "daily")]
    Daily,
}

impl UpdateInterval {
    /// `None` for manual updates.
    pub fn period(self) -> Option<Duration> {
        let secs = match self {
            UpdateInterval::Manual => return None,
            UpdateInterval::ThirtyMinutes => 30 * 60,
            UpdateInterval::OneHour => 60 * 60,
            UpdateInterval::SixHours => 6 * 60 * 60,
            UpdateInterval::Daily => 24 * 60 * 60,
        };
        Some(Duration::from_secs(secs))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateInterval::Manual => "manual",
            UpdateInterval::ThirtyMinutes => "30min",
            UpdateInterval::OneHour => "1hour",
            UpdateInterval::SixHours => "6hour",
            UpdateInterval::Daily => "daily",
        }
    }
}

impl fmt::Display for UpdateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs a callback every period until stopped. At most one timer is live;
/// starting again replaces the previous one.
#[derive(Default)]
pub struct Scheduler {
    task: Mutex<Option<AbortHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first tick fires one full `period` after this call. A tick that
    /// comes due while the previous callback is still running is delayed,
    /// not stacked.
    pub fn start<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        let first = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut timer = interval_at(first, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                tick().await;
            }
        });
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle.abort_handle());
        }
    }

    /// Starts for a named interval; `Manual` just stops. Returns whether a
    /// timer is now running.
    pub fn start_for<F, Fut>(&self, interval: UpdateInterval, tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match interval.period() {
            Some(period) => {
                self.start(period, tick);
                true
            }
            None => {
                self.stop();
                false
            }
        }
    }

    pub fn stop(&self) {
        if let Ok(mut slot) = self.task.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
