//! Definitions, which are used by alarm scheduler and its users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::timer_primitive::TimerKind;

use super::error::{AlarmError, AlarmResult};

/// Specifies timing of the alarm.
///
/// Values are expressed in the coarse time unit of the scheduler,
/// see [`SchedulerConfig::time_unit`][crate::SchedulerConfig::time_unit].
///
/// If both `period` and `delay` are set, the alarm is repeating and `delay` is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Repeat period. Presence makes the alarm repeating.
    #[serde(default)]
    pub period: Option<f64>,
    /// Delay of the one-shot alarm.
    #[serde(default)]
    pub delay: Option<f64>,
}

impl AlarmConfig {
    /// Config of the alarm which fires once after `delay`.
    pub fn once(delay: f64) -> Self {
        Self {
            period: None,
            delay: Some(delay),
        }
    }

    /// Config of the alarm which fires every `period`.
    pub fn repeating(period: f64) -> Self {
        Self {
            period: Some(period),
            delay: None,
        }
    }

    /// Validates config and returns timing mode with the coarse value.
    pub(crate) fn timing(&self) -> AlarmResult<(TimerKind, f64)> {
        let (kind, value) = match (self.period, self.delay) {
            (Some(period), _) => (TimerKind::Repeating, period),
            (None, Some(delay)) => (TimerKind::OneShot, delay),
            (None, None) => return Err(AlarmError::MissingTiming),
        };

        if value.is_finite() && value > 0.0 {
            Ok((kind, value))
        } else {
            Err(AlarmError::InvalidDuration { value })
        }
    }
}

/// Read-only copy of the alarm state.
///
/// Snapshot is detached from the scheduler, so changing it does not affect the alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSnapshot {
    /// Unique name of the alarm.
    pub name: String,
    /// Time of the next fire. Absent if alarm is not scheduled.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Repeat period in the coarse time unit. Absent for one-shot alarms.
    pub period: Option<f64>,
}

impl AlarmSnapshot {
    /// Returns `true` if alarm is scheduled to fire.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled_time.is_some()
    }

    /// Returns `true` if alarm is repeating.
    pub fn is_repeating(&self) -> bool {
        self.period.is_some()
    }
}
