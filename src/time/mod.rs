//! Definition of timer primitives, which are used by [`crate::AlarmScheduler`] to arm alarms.

pub mod manual_timer;
pub mod thread_timer;
pub mod timer_primitive;
pub mod tokio_timer;

#[cfg(test)]
mod tests;
