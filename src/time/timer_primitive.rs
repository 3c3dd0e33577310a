//! Definition of the [`TimerPrimitive`] trait, which is used by [`crate::AlarmScheduler`] to arm timers.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alarm::error::AlarmError;

/// Result of handling a single timer tick.
///
/// Error means some listeners of the fired alarm failed.
/// Timer primitives must not stop other timers because of it.
pub type TickResult = Result<(), AlarmError>;

/// Callback which is invoked by [`TimerPrimitive`] every time the timer fires.
pub type TickCallback = Box<dyn FnMut() -> TickResult>;

/// Specifies kind of the armed timer.
///
/// One-shot and repeating timers are cancelled by different calls,
/// so the kind is stored together with the token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Timer fires once after the delay.
    OneShot,
    /// Timer fires every period until cancelled.
    Repeating,
}

/// Specifies [`TimerPrimitive`] trait, which is used by [`crate::AlarmScheduler`] to set timers.
///
/// Implementations must never invoke the callback from inside of
/// [`after`][TimerPrimitive::after] or [`every`][TimerPrimitive::every],
/// and must invoke callbacks on the thread which owns the scheduler.
pub trait TimerPrimitive {
    /// Handle of the armed timer, which allows to cancel it.
    type Token;

    /// Returns current time as seen by the timer.
    fn now(&self) -> DateTime<Utc>;

    /// Invoke `callback` once after `delay` elapsed.
    fn after(&self, delay: Duration, callback: TickCallback) -> Self::Token;

    /// Invoke `callback` every `period` until cancelled.
    /// The first invocation happens after one `period`.
    fn every(&self, period: Duration, callback: TickCallback) -> Self::Token;

    /// Cancel timer previously set by [`after`][TimerPrimitive::after].
    fn cancel_after(&self, token: Self::Token);

    /// Cancel timer previously set by [`every`][TimerPrimitive::every].
    fn cancel_every(&self, token: Self::Token);
}
