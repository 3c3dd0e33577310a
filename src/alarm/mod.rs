//! Definition of the alarm registry, listener directory and [`scheduler`][`crate::AlarmScheduler`].

pub mod config;
pub mod defs;
pub mod error;
pub mod listeners;
pub mod scheduler;

mod registry;
