//! Definition of the alarm registry, which maps alarm names to their state.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};

use crate::time::timer_primitive::{TimerKind, TimerPrimitive};

use super::defs::AlarmSnapshot;

/// Timer armed for the alarm.
///
/// Owned exclusively by the registry entry and released exactly once:
/// either cancelled on re-arm or clear, or dropped after one-shot timer fired.
pub(crate) struct ArmedTimer<K> {
    pub kind: TimerKind,
    pub token: K,
    /// Generation of the arming. Ticks with other id are stale.
    pub id: u64,
    /// Scaled period or delay.
    pub interval: Duration,
}

impl<K> ArmedTimer<K> {
    /// Cancel timer with the call which corresponds to its kind.
    pub fn cancel<T: TimerPrimitive<Token = K>>(self, timer: &T) {
        match self.kind {
            TimerKind::OneShot => timer.cancel_after(self.token),
            TimerKind::Repeating => timer.cancel_every(self.token),
        }
    }
}

/// State of a single alarm.
pub(crate) struct AlarmEntry<K> {
    /// Name of the alarm.
    pub name: String,
    /// Time of the next fire, `None` if alarm is not scheduled.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Period in time units, `None` if alarm is not repeating.
    pub period: Option<f64>,
    /// Whether alarm has fired at least once.
    pub is_fired: bool,
    /// Timer armed for the alarm, if any.
    pub armed: Option<ArmedTimer<K>>,
}

impl<K> AlarmEntry<K> {
    /// Entry without schedule, created when listener precedes the alarm.
    fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            scheduled_time: None,
            period: None,
            is_fired: false,
            armed: None,
        }
    }

    /// Returns detached copy of the public fields.
    pub fn snapshot(&self) -> AlarmSnapshot {
        AlarmSnapshot {
            name: self.name.clone(),
            scheduled_time: self.scheduled_time,
            period: self.period,
        }
    }

    /// Returns `true` if alarm is armed with timer of generation `id`.
    pub fn is_armed_with(&self, id: u64) -> bool {
        self.armed.as_ref().map_or(false, |armed| armed.id == id)
    }
}

/// Returns `now + interval`, or `None` if it is not representable.
pub(crate) fn deadline_after(now: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| now.checked_add_signed(interval))
}

/// Maps alarm names to their state.
///
/// At most one entry exists per name. Iteration order is the order of names.
pub(crate) struct Registry<K> {
    /// Entries by name.
    alarms: BTreeMap<String, AlarmEntry<K>>,
    /// Generation of the next arming.
    next_arm_id: u64,
}

impl<K> Default for Registry<K> {
    fn default() -> Self {
        Self {
            alarms: BTreeMap::new(),
            next_arm_id: 0,
        }
    }
}

impl<K> Registry<K> {
    /// Returns fresh arming generation.
    pub fn next_arm_id(&mut self) -> u64 {
        let id = self.next_arm_id;
        self.next_arm_id += 1;
        id
    }

    /// Returns entry of the alarm.
    pub fn get(&self, name: &str) -> Option<&AlarmEntry<K>> {
        self.alarms.get(name)
    }

    /// Returns mutable entry of the alarm.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut AlarmEntry<K>> {
        self.alarms.get_mut(name)
    }

    /// Returns entry of the alarm, creating placeholder if there is no such alarm.
    pub fn entry_or_placeholder(&mut self, name: &str) -> &mut AlarmEntry<K> {
        self.alarms
            .entry(name.to_owned())
            .or_insert_with(|| AlarmEntry::placeholder(name))
    }

    /// Remove entry of the alarm and return it.
    pub fn remove(&mut self, name: &str) -> Option<AlarmEntry<K>> {
        self.alarms.remove(name)
    }

    /// Remove all entries and return them.
    pub fn drain(&mut self) -> Vec<AlarmEntry<K>> {
        std::mem::take(&mut self.alarms).into_values().collect()
    }

    /// Returns snapshots of all alarms ordered by name.
    pub fn snapshots(&self) -> Vec<AlarmSnapshot> {
        self.alarms.values().map(AlarmEntry::snapshot).collect()
    }

    /// Returns number of entries, including placeholders.
    pub fn len(&self) -> usize {
        self.alarms.len()
    }
}
