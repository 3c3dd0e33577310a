//! Definition of [`SchedulerConfig`].

use std::time::Duration;

use serde::Deserialize;

use super::error::{AlarmError, AlarmResult, ConfigError};

/// Represents configuration of [`AlarmScheduler`][crate::AlarmScheduler].
///
/// Configuration is fixed when scheduler is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Duration of one coarse time unit, in which periods and delays of alarms are expressed.
    time_unit: Duration,
}

/// Serialized form of [`SchedulerConfig`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchedulerConfig {
    /// Time unit in milliseconds.
    #[serde(default = "default_time_unit_ms")]
    time_unit_ms: u64,
}

/// Returns [`SchedulerConfig::DEFAULT_TIME_UNIT`] in milliseconds.
fn default_time_unit_ms() -> u64 {
    SchedulerConfig::DEFAULT_TIME_UNIT.as_millis() as u64
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_unit: Self::DEFAULT_TIME_UNIT,
        }
    }
}

impl SchedulerConfig {
    /// Default time unit, which is one second.
    pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

    /// Creates new instance of [`SchedulerConfig`].
    ///
    /// * `time_unit` - Duration of one coarse time unit. This value must be greater than zero.
    pub fn new(time_unit: Duration) -> Result<Self, ConfigError> {
        if time_unit.is_zero() {
            Err(ConfigError::ZeroTimeUnit)
        } else {
            Ok(Self { time_unit })
        }
    }

    /// Parses config from JSON like `{"time_unit_ms": 1000}`.
    ///
    /// Missing `time_unit_ms` means [`SchedulerConfig::DEFAULT_TIME_UNIT`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawSchedulerConfig =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::new(Duration::from_millis(raw.time_unit_ms))
    }

    /// Returns duration of one coarse time unit.
    pub fn time_unit(&self) -> Duration {
        self.time_unit
    }

    /// Converts `value` coarse units into the duration.
    pub(crate) fn scale(&self, value: f64) -> AlarmResult<Duration> {
        let scaled = Duration::try_from_secs_f64(self.time_unit.as_secs_f64() * value)
            .map_err(|_| AlarmError::DurationOutOfRange { value })?;
        if scaled.is_zero() {
            return Err(AlarmError::InvalidDuration { value });
        }
        Ok(scaled)
    }
}
