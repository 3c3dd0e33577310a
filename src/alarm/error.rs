//! Definition of errors which can appear when working with alarms.

use std::fmt;

use super::listeners::{ListenerId, ListenerScope};

////////////////////////////////////////////////////////////////////////////////

/// Represents failure of a single listener during fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    /// Registration which failed.
    pub listener: ListenerId,
    /// Whether listener was attached to the alarm or globally.
    pub scope: ListenerScope,
    /// Error returned by the listener.
    pub reason: String,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} listener {} failed: {}",
            self.scope, self.listener, self.reason
        )
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Represents errors of the [`scheduler`][crate::AlarmScheduler] operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmError {
    /// Alarm name is empty.
    EmptyName,
    /// Alarm config specifies neither period nor delay.
    MissingTiming,
    /// Period or delay is not a positive finite number.
    InvalidDuration {
        /// Rejected value.
        value: f64,
    },
    /// Period or delay is too large to be scheduled.
    DurationOutOfRange {
        /// Rejected value.
        value: f64,
    },
    /// Some listeners failed while alarm was fired.
    /// Other listeners of the same fire event were still notified.
    Handler {
        /// Name of the fired alarm.
        alarm: String,
        /// Failures in the order listeners were invoked.
        failures: Vec<HandlerFailure>,
    },
}

impl AlarmError {
    /// Returns `true` for errors which are raised before any state mutation.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Handler { .. })
    }
}

impl fmt::Display for AlarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "alarm name can not be empty"),
            Self::MissingTiming => write!(f, "specify the period or delay"),
            Self::InvalidDuration { value } => {
                write!(f, "period or delay must be positive, got {}", value)
            }
            Self::DurationOutOfRange { value } => {
                write!(f, "period or delay {} is out of range", value)
            }
            Self::Handler { alarm, failures } => {
                write!(f, "{} listener(s) of alarm '{}' failed", failures.len(), alarm)?;
                for failure in failures {
                    write!(f, "; {}", failure)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AlarmError {}

////////////////////////////////////////////////////////////////////////////////

/// Represents errors of building [`SchedulerConfig`][crate::SchedulerConfig].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Time unit is zero.
    ZeroTimeUnit,
    /// Config can not be parsed.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTimeUnit => write!(f, "time unit can not be zero"),
            Self::Parse(info) => write!(f, "can not parse scheduler config: {}", info),
        }
    }
}

impl std::error::Error for ConfigError {}

////////////////////////////////////////////////////////////////////////////////

/// Represents result of the alarm operations.
pub type AlarmResult<T> = Result<T, AlarmError>;
