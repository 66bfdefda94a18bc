//! Time-window progress for a single election.
//!
//! [`compute`] is the pure ratio; [`ProgressClock`] re-evaluates it on a fixed
//! cadence and hands each sample to a callback until the returned
//! [`ProgressSubscription`] is cancelled or dropped.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use shared::domain::Election;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::clock::Clock;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_NEAR_END_THRESHOLD: f64 = 0.8;

/// `(now - start) / (end - start)`.
///
/// Total over all inputs: a window with `end <= start` is treated as already
/// over and yields `1.0`.
pub fn compute(now: i64, start: i64, end: i64) -> f64 {
    if end <= start {
        return 1.0;
    }
    let elapsed = i128::from(now) - i128::from(start);
    let window = i128::from(end) - i128::from(start);
    elapsed as f64 / window as f64
}

/// Progress of `election` at `now_ms`, or `None` when its window runs backwards.
pub fn progress_of(election: &Election, now_ms: i64) -> Option<ProgressState> {
    if election.is_malformed() {
        return None;
    }
    Some(ProgressState::new(compute(
        now_ms,
        election.start_date,
        election.end_date,
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    NotStarted,
    InProgress,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub ratio: f64,
}

impl ProgressState {
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    pub fn phase(&self) -> ProgressPhase {
        if self.ratio <= 0.0 {
            ProgressPhase::NotStarted
        } else if self.ratio < 1.0 {
            ProgressPhase::InProgress
        } else {
            ProgressPhase::Ended
        }
    }

    /// Progress is only displayed strictly inside the window.
    pub fn is_visible(&self) -> bool {
        self.phase() == ProgressPhase::InProgress
    }

    pub fn is_near_end(&self, threshold: f64) -> bool {
        self.is_visible() && self.ratio >= threshold
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressConfig {
    pub tick_interval: Duration,
    pub near_end_threshold: f64,
    /// Stop ticking after the first `Ended` sample has been delivered.
    pub stop_when_ended: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            near_end_threshold: DEFAULT_NEAR_END_THRESHOLD,
            stop_when_ended: true,
        }
    }
}

type ProgressCallback = Box<dyn FnMut(ProgressState) + Send>;

#[derive(Clone)]
pub struct ProgressClock {
    clock: Arc<dyn Clock>,
    start: i64,
    end: i64,
    config: ProgressConfig,
}

impl ProgressClock {
    pub fn new(clock: Arc<dyn Clock>, start: i64, end: i64, config: ProgressConfig) -> Self {
        Self {
            clock,
            start,
            end,
            config,
        }
    }

    pub fn for_election(
        clock: Arc<dyn Clock>,
        election: &Election,
        config: ProgressConfig,
    ) -> Option<Self> {
        if election.is_malformed() {
            return None;
        }
        Some(Self::new(
            clock,
            election.start_date,
            election.end_date,
            config,
        ))
    }

    pub fn sample(&self) -> ProgressState {
        ProgressState::new(compute(self.clock.now_ms(), self.start, self.end))
    }

    /// Invokes `callback` with a fresh sample every `tick_interval`, first
    /// firing one interval from now. Must be called inside a tokio runtime.
    pub fn start<F>(self, callback: F) -> ProgressSubscription
    where
        F: FnMut(ProgressState) + Send + 'static,
    {
        let slot: Arc<Mutex<Option<ProgressCallback>>> =
            Arc::new(Mutex::new(Some(Box::new(callback))));
        let task_slot = Arc::clone(&slot);
        let period = self.config.tick_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let progress = self.sample();

                let mut guard = match task_slot.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let Some(callback) = guard.as_mut() else {
                    break;
                };
                callback(progress);

                if self.config.stop_when_ended && progress.phase() == ProgressPhase::Ended {
                    guard.take();
                    debug!(ratio = progress.ratio, "progress: window ended, ticker stopped");
                    break;
                }
            }
        });

        ProgressSubscription { slot, task }
    }
}

/// Owns a running [`ProgressClock`]. Cancelling (or dropping) it guarantees
/// the callback is never invoked again, including for a tick that has already
/// fired but not yet been delivered.
pub struct ProgressSubscription {
    slot: Arc<Mutex<Option<ProgressCallback>>>,
    task: JoinHandle<()>,
}

impl ProgressSubscription {
    pub fn cancel(&self) {
        // Taking the lock waits out a callback that is mid-delivery.
        match self.slot.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        let has_callback = match self.slot.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        };
        has_callback && !self.task.is_finished()
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
