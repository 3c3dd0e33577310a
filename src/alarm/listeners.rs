//! Definition of the listener directory and [`Subscription`].

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use super::defs::AlarmSnapshot;

/// Listener of the alarm fire events.
///
/// Listener returns `Err` to report failure. Failure does not stop notifying other listeners.
pub type Listener = Rc<dyn Fn(&AlarmSnapshot) -> Result<(), String>>;

/// Identity of a single listener registration.
///
/// The same handler registered twice gets two different ids.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Specifies whether listener is attached to one alarm or to all of them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListenerScope {
    /// Listener of the single named alarm.
    Alarm,
    /// Listener of every alarm.
    Global,
}

/// Owns per-alarm and global listener sequences.
///
/// Sequences keep insertion order, which is the order of notification.
#[derive(Default)]
pub(crate) struct ListenerDirectory {
    /// Id of the next registration.
    next_id: u64,
    /// Listeners of the single alarm by alarm name.
    per_alarm: HashMap<String, Vec<(ListenerId, Listener)>>,
    /// Listeners of all alarms.
    global: Vec<(ListenerId, Listener)>,
}

/// Remove registration `id` from `listeners`. Returns `false` if there is no such registration.
fn remove_registration(listeners: &mut Vec<(ListenerId, Listener)>, id: ListenerId) -> bool {
    match listeners.iter().position(|(listener_id, _)| *listener_id == id) {
        Some(index) => {
            listeners.remove(index);
            true
        }
        None => false,
    }
}

impl ListenerDirectory {
    /// Returns fresh registration id.
    fn next_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append listener of the alarm `name`.
    pub fn add_alarm_listener(&mut self, name: &str, listener: Listener) -> ListenerId {
        let id = self.next_id();
        self.per_alarm
            .entry(name.to_owned())
            .or_default()
            .push((id, listener));
        id
    }

    /// Append listener of all alarms.
    pub fn add_global_listener(&mut self, listener: Listener) -> ListenerId {
        let id = self.next_id();
        self.global.push((id, listener));
        id
    }

    /// Remove registration `id` of the alarm `name`.
    pub fn remove_alarm_listener(&mut self, name: &str, id: ListenerId) -> bool {
        self.per_alarm
            .get_mut(name)
            .map_or(false, |listeners| remove_registration(listeners, id))
    }

    /// Remove global registration `id`.
    pub fn remove_global_listener(&mut self, id: ListenerId) -> bool {
        remove_registration(&mut self.global, id)
    }

    /// Drop all listeners of the alarm.
    pub fn drop_alarm(&mut self, name: &str) {
        self.per_alarm.remove(name);
    }

    /// Drop all per-alarm and global listeners.
    /// Ids are never reused, so stale subscriptions can not remove new registrations.
    pub fn clear(&mut self) {
        self.per_alarm.clear();
        self.global.clear();
    }

    /// Returns listeners to notify when alarm `name` fires:
    /// per-alarm listeners first, then global ones, each in insertion order.
    pub fn listeners_for(&self, name: &str) -> Vec<(ListenerScope, ListenerId, Listener)> {
        let per_alarm = self
            .per_alarm
            .get(name)
            .into_iter()
            .flatten()
            .map(|(id, listener)| (ListenerScope::Alarm, *id, listener.clone()));
        let global = self
            .global
            .iter()
            .map(|(id, listener)| (ListenerScope::Global, *id, listener.clone()));
        per_alarm.chain(global).collect()
    }

    /// Returns number of listeners of the alarm `name`.
    pub fn alarm_listener_count(&self, name: &str) -> usize {
        self.per_alarm.get(name).map_or(0, Vec::len)
    }

    /// Returns number of global listeners.
    pub fn global_listener_count(&self) -> usize {
        self.global.len()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Registration which the subscription removes.
#[derive(Debug, Clone)]
enum SubscriptionTarget {
    /// Listener of the named alarm.
    Alarm(String),
    /// Global listener.
    Global,
}

/// Handle of a single listener registration, returned by
/// [`listen_to_alarm`][crate::AlarmScheduler::listen_to_alarm] and
/// [`listen_to_all_alarms`][crate::AlarmScheduler::listen_to_all_alarms].
///
/// Dropping the subscription does not remove the listener.
/// Subscription does not keep the scheduler alive.
#[derive(Clone)]
pub struct Subscription {
    /// Directory of the scheduler, which may be already dropped.
    directory: Weak<RefCell<ListenerDirectory>>,
    /// Sequence the registration belongs to.
    target: SubscriptionTarget,
    /// Id of the registration.
    id: ListenerId,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    /// Subscription of the listener of the alarm `name`.
    pub(crate) fn alarm(
        directory: &Rc<RefCell<ListenerDirectory>>,
        name: &str,
        id: ListenerId,
    ) -> Self {
        Self {
            directory: Rc::downgrade(directory),
            target: SubscriptionTarget::Alarm(name.to_owned()),
            id,
        }
    }

    /// Subscription of the global listener.
    pub(crate) fn global(directory: &Rc<RefCell<ListenerDirectory>>, id: ListenerId) -> Self {
        Self {
            directory: Rc::downgrade(directory),
            target: SubscriptionTarget::Global,
            id,
        }
    }

    /// Returns id of the registration.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns name of the alarm, or `None` for the global listener.
    pub fn alarm_name(&self) -> Option<&str> {
        match &self.target {
            SubscriptionTarget::Alarm(name) => Some(name),
            SubscriptionTarget::Global => None,
        }
    }

    /// Remove the registration.
    ///
    /// Returns `false` if it was already removed, or if the scheduler is dropped.
    pub fn unsubscribe(&self) -> bool {
        let Some(shared) = self.directory.upgrade() else {
            return false;
        };
        let mut directory = shared.borrow_mut();
        match &self.target {
            SubscriptionTarget::Alarm(name) => directory.remove_alarm_listener(name, self.id),
            SubscriptionTarget::Global => directory.remove_global_listener(self.id),
        }
    }
}
