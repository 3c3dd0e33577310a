//! Library for scheduling named one-shot and repeating alarms
//! and notifying listeners when they fire.
//!
//! Alarms are managed by [`AlarmScheduler`], which arms timers through
//! an injected [`TimerPrimitive`]. Use [`ManualTimer`] for deterministic
//! tests and simulations, [`TokioTimer`] inside of a current-thread tokio runtime,
//! or [`ThreadTimer`] to wait for deadlines in a background thread.

// Add warnings for missing public and private documentation.
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

pub mod alarm;

pub mod time;

pub use alarm::{
    config::SchedulerConfig,
    defs::{AlarmConfig, AlarmSnapshot},
    error::{AlarmError, AlarmResult, ConfigError, HandlerFailure},
    listeners::{Listener, ListenerId, ListenerScope, Subscription},
    scheduler::AlarmScheduler,
};

pub use time::{
    manual_timer::{ManualTimer, ManualTimerToken},
    thread_timer::{ThreadTimer, ThreadTimerToken},
    timer_primitive::{TickCallback, TickResult, TimerKind, TimerPrimitive},
    tokio_timer::TokioTimer,
};
