//! Definition of [`TokioTimer`], which arms timers as tasks of the current-thread tokio runtime.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use super::timer_primitive::{TickCallback, TickResult, TimerPrimitive};

/// Timer which spawns every armed timer as a local tokio task.
///
/// Callbacks of the scheduler are not [`Send`], so tasks are spawned with
/// [`tokio::task::spawn_local`]. Cancellation aborts the task.
///
/// [`now`][TimerPrimitive::now] follows the tokio clock, so it stays consistent
/// with the armed timers when the clock is paused or advanced manually.
/// Wall-clock time is read once, when the timer is created.
///
/// # Panics
///
/// - Arming a timer outside of [`tokio::task::LocalSet`] panics.
/// - Arming a repeating timer with zero period panics.
#[derive(Copy, Clone, Debug)]
pub struct TokioTimer {
    /// Wall-clock time when the timer was created.
    started_at: DateTime<Utc>,
    /// Tokio clock reading taken together with `started_at`.
    started_instant: Instant,
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioTimer {
    /// Create new timer anchored at the current wall-clock time.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started_instant: Instant::now(),
        }
    }
}

/// There is no caller to return the tick result to, so failures are only logged.
fn report(result: TickResult) {
    if let Err(err) = result {
        log::error!("Alarm tick failed: {}", err);
    }
}

impl TimerPrimitive for TokioTimer {
    type Token = JoinHandle<()>;

    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.started_instant);
        chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|elapsed| self.started_at.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn after(&self, delay: Duration, mut callback: TickCallback) -> JoinHandle<()> {
        tokio::task::spawn_local(async move {
            time::sleep(delay).await;
            report(callback());
        })
    }

    fn every(&self, period: Duration, mut callback: TickCallback) -> JoinHandle<()> {
        tokio::task::spawn_local(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                report(callback());
            }
        })
    }

    fn cancel_after(&self, token: JoinHandle<()>) {
        token.abort();
    }

    fn cancel_every(&self, token: JoinHandle<()>) {
        token.abort();
    }
}
