//! Definition of [`AlarmScheduler`].

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use log::{debug, trace, warn};

use crate::time::timer_primitive::{TickCallback, TickResult, TimerKind, TimerPrimitive};

use super::{
    config::SchedulerConfig,
    defs::{AlarmConfig, AlarmSnapshot},
    error::{AlarmError, AlarmResult, HandlerFailure},
    listeners::{Listener, ListenerDirectory, ListenerId, Subscription},
    registry::{deadline_after, ArmedTimer, Registry},
};

/// State shared between scheduler handles and tick callbacks.
struct Shared<T: TimerPrimitive> {
    /// Timer which arms alarms.
    timer: T,
    /// Config the scheduler was created with.
    config: SchedulerConfig,
    /// Alarms by name.
    registry: RefCell<Registry<T::Token>>,
    /// Listener registrations, shared with subscriptions.
    listeners: Rc<RefCell<ListenerDirectory>>,
}

impl<T: TimerPrimitive> Drop for Shared<T> {
    fn drop(&mut self) {
        for entry in self.registry.get_mut().drain() {
            if let Some(armed) = entry.armed {
                armed.cancel(&self.timer);
            }
        }
    }
}

/// Represents scheduler of the named alarms.
///
/// User can [create][AlarmScheduler::create_alarm] one-shot or repeating alarms,
/// [listen][AlarmScheduler::listen_to_alarm] to a single alarm or
/// [to all of them][AlarmScheduler::listen_to_all_alarms],
/// [query][AlarmScheduler::get_alarm] and [clear][AlarmScheduler::clear_alarm] alarms.
///
/// Alarms are armed through the [`TimerPrimitive`] passed on creation. When timer fires,
/// listeners of the alarm are notified first and global listeners after them,
/// each in the order they were registered.
///
/// Scheduler is single-threaded. Internal state is never borrowed while listeners run,
/// so listeners can call back into the scheduler. The listener set is fixed when
/// the fire event starts: listeners added during it are notified starting from the next event.
///
/// [`AlarmScheduler`] is a handle: clones operate on the same alarms.
/// Listeners which capture a clone keep the scheduler alive until they are removed,
/// for example by [`clear_all_alarms`][AlarmScheduler::clear_all_alarms].
///
/// When the last handle is dropped, all armed timers are cancelled.
pub struct AlarmScheduler<T: TimerPrimitive + 'static> {
    /// State shared between handles.
    shared: Rc<Shared<T>>,
}

impl<T: TimerPrimitive + 'static> Clone for AlarmScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Rejects empty alarm names.
fn validate_name(name: &str) -> AlarmResult<()> {
    if name.is_empty() {
        Err(AlarmError::EmptyName)
    } else {
        Ok(())
    }
}

impl<T: TimerPrimitive + 'static> AlarmScheduler<T> {
    /// Create new scheduler, which arms alarms with `timer`.
    pub fn new(timer: T, config: SchedulerConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                timer,
                config,
                registry: RefCell::new(Registry::default()),
                listeners: Rc::new(RefCell::new(ListenerDirectory::default())),
            }),
        }
    }

    /// Create new scheduler with [default config][SchedulerConfig::default].
    pub fn with_timer(timer: T) -> Self {
        Self::new(timer, SchedulerConfig::default())
    }

    /// Returns config of the scheduler.
    pub fn config(&self) -> SchedulerConfig {
        self.shared.config
    }

    /// Returns timer used by the scheduler.
    pub fn timer(&self) -> &T {
        &self.shared.timer
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Alarms
    ////////////////////////////////////////////////////////////////////////////////

    /// Create alarm with specified name and timing, or re-arm existing one.
    ///
    /// If alarm with such name is already armed, its timer is cancelled,
    /// so there is never more than one pending timer per name.
    ///
    /// # Errors
    ///
    /// - [`AlarmError::EmptyName`] if `name` is empty.
    /// - [`AlarmError::MissingTiming`] if `config` has neither period nor delay.
    /// - [`AlarmError::InvalidDuration`] if period or delay is not positive.
    /// - [`AlarmError::DurationOutOfRange`] if period or delay is too large.
    ///
    /// Nothing is changed if error is returned.
    pub fn create_alarm(&self, name: &str, config: AlarmConfig) -> AlarmResult<AlarmSnapshot> {
        validate_name(name)?;
        let (kind, value) = config.timing()?;
        let interval = self.shared.config.scale(value)?;
        let scheduled_time = deadline_after(self.shared.timer.now(), interval)
            .ok_or(AlarmError::DurationOutOfRange { value })?;

        let timer = &self.shared.timer;
        let mut registry = self.shared.registry.borrow_mut();
        let arm_id = registry.next_arm_id();
        let entry = registry.entry_or_placeholder(name);

        if let Some(previous) = entry.armed.take() {
            debug!("Re-arming alarm '{}', previous timer cancelled", name);
            previous.cancel(timer);
        }

        let callback = self.tick_callback(name, arm_id);
        let token = match kind {
            TimerKind::OneShot => timer.after(interval, callback),
            TimerKind::Repeating => timer.every(interval, callback),
        };

        entry.armed = Some(ArmedTimer {
            kind,
            token,
            id: arm_id,
            interval,
        });
        entry.scheduled_time = Some(scheduled_time);
        entry.period = match kind {
            TimerKind::OneShot => None,
            TimerKind::Repeating => Some(value),
        };

        debug!(
            "Alarm '{}' armed as {:?}, fires at {}",
            name, kind, scheduled_time
        );

        Ok(entry.snapshot())
    }

    /// Cancel alarm and remove it together with its listeners.
    ///
    /// Tick of the alarm which is already in flight is ignored.
    /// Returns `false` if there is no such alarm.
    pub fn clear_alarm(&self, name: &str) -> bool {
        let removed = self.shared.registry.borrow_mut().remove(name);
        let Some(entry) = removed else {
            return false;
        };

        if let Some(armed) = entry.armed {
            armed.cancel(&self.shared.timer);
        }
        self.shared.listeners.borrow_mut().drop_alarm(name);

        debug!("Alarm '{}' cleared", name);
        true
    }

    /// Cancel and remove all alarms, and remove all listeners including global ones.
    pub fn clear_all_alarms(&self) {
        let entries = self.shared.registry.borrow_mut().drain();
        let count = entries.len();
        for entry in entries {
            if let Some(armed) = entry.armed {
                armed.cancel(&self.shared.timer);
            }
        }
        self.shared.listeners.borrow_mut().clear();

        debug!("All alarms cleared ({} removed)", count);
    }

    /// Returns snapshot of the alarm, or `None` if there is no such alarm.
    pub fn get_alarm(&self, name: &str) -> Option<AlarmSnapshot> {
        self.shared.registry.borrow().get(name).map(|entry| entry.snapshot())
    }

    /// Returns snapshots of all alarms ordered by name.
    pub fn get_all_alarms(&self) -> Vec<AlarmSnapshot> {
        self.shared.registry.borrow().snapshots()
    }

    /// Returns `true` if alarm with such name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.shared.registry.borrow().get(name).is_some()
    }

    /// Returns `true` if alarm exists and has fired at least once.
    pub fn has_fired(&self, name: &str) -> bool {
        self.shared
            .registry
            .borrow()
            .get(name)
            .map_or(false, |entry| entry.is_fired)
    }

    /// Returns number of alarms, including placeholders created by listeners.
    pub fn len(&self) -> usize {
        self.shared.registry.borrow().len()
    }

    /// Returns `true` if there are no alarms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Firing
    ////////////////////////////////////////////////////////////////////////////////

    /// Mark alarm as fired and notify its listeners, then global listeners.
    ///
    /// Does not touch the timer of the alarm. Returns `Ok(false)` if there is no such alarm.
    ///
    /// # Errors
    ///
    /// - [`AlarmError::Handler`] if some listeners failed. All listeners are notified anyway.
    pub fn fire_alarm(&self, name: &str) -> AlarmResult<bool> {
        let snapshot = {
            let mut registry = self.shared.registry.borrow_mut();
            let Some(entry) = registry.get_mut(name) else {
                return Ok(false);
            };
            entry.is_fired = true;
            entry.snapshot()
        };
        let listeners = self.shared.listeners.borrow().listeners_for(name);

        trace!("Alarm '{}' fired, notifying {} listener(s)", name, listeners.len());

        let failures: Vec<HandlerFailure> = listeners
            .into_iter()
            .filter_map(|(scope, id, listener)| {
                listener(&snapshot).err().map(|reason| {
                    warn!(
                        "{:?} listener {} of alarm '{}' failed: {}",
                        scope, id, name, reason
                    );
                    HandlerFailure {
                        listener: id,
                        scope,
                        reason,
                    }
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(true)
        } else {
            Err(AlarmError::Handler {
                alarm: name.to_owned(),
                failures,
            })
        }
    }

    /// Returns callback which handles ticks of the alarm without keeping the scheduler alive.
    fn tick_callback(&self, name: &str, arm_id: u64) -> TickCallback {
        let shared: Weak<Shared<T>> = Rc::downgrade(&self.shared);
        let name = name.to_owned();
        Box::new(move || match shared.upgrade() {
            Some(shared) => AlarmScheduler { shared }.on_tick(&name, arm_id),
            None => Ok(()),
        })
    }

    /// Handles tick of the timer armed with generation `arm_id`.
    fn on_tick(&self, name: &str, arm_id: u64) -> TickResult {
        let is_current = self
            .shared
            .registry
            .borrow()
            .get(name)
            .map_or(false, |entry| entry.is_armed_with(arm_id));
        if !is_current {
            trace!("Ignoring stale tick of alarm '{}'", name);
            return Ok(());
        }

        let result = self.fire_alarm(name).map(|_| ());

        // Listeners could clear or re-arm the alarm, then its state is not ours to update.
        let now = self.shared.timer.now();
        let mut registry = self.shared.registry.borrow_mut();
        if let Some(entry) = registry.get_mut(name).filter(|entry| entry.is_armed_with(arm_id)) {
            let rearm = entry
                .armed
                .as_ref()
                .map(|armed| (armed.kind, armed.interval));
            match rearm {
                Some((TimerKind::Repeating, interval)) => {
                    entry.scheduled_time = deadline_after(now, interval);
                    trace!("Alarm '{}' fires next at {:?}", name, entry.scheduled_time);
                }
                Some((TimerKind::OneShot, _)) => {
                    // Timer has expired by itself.
                    entry.armed = None;
                    entry.scheduled_time = None;
                    entry.period = None;
                }
                None => {}
            }
        }

        result
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Listeners
    ////////////////////////////////////////////////////////////////////////////////

    /// Register `handler` as listener of the alarm `name`.
    ///
    /// If there is no such alarm, placeholder without schedule is created,
    /// so listener can be registered before the alarm is created.
    ///
    /// # Errors
    ///
    /// - [`AlarmError::EmptyName`] if `name` is empty.
    pub fn listen_to_alarm<F>(&self, name: &str, handler: F) -> AlarmResult<Subscription>
    where
        F: Fn(&AlarmSnapshot) -> Result<(), String> + 'static,
    {
        validate_name(name)?;
        self.shared.registry.borrow_mut().entry_or_placeholder(name);

        let listener: Listener = Rc::new(handler);
        let id = self
            .shared
            .listeners
            .borrow_mut()
            .add_alarm_listener(name, listener);

        trace!("Listener {} attached to alarm '{}'", id, name);
        Ok(Subscription::alarm(&self.shared.listeners, name, id))
    }

    /// Register `handler` as listener of all alarms.
    pub fn listen_to_all_alarms<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AlarmSnapshot) -> Result<(), String> + 'static,
    {
        let listener: Listener = Rc::new(handler);
        let id = self.shared.listeners.borrow_mut().add_global_listener(listener);

        trace!("Global listener {} attached", id);
        Subscription::global(&self.shared.listeners, id)
    }

    /// Remove listener registration `id` of the alarm `name`.
    /// Returns `false` if there is no such registration.
    pub fn stop_listening_to_alarm(&self, name: &str, id: ListenerId) -> bool {
        self.shared
            .listeners
            .borrow_mut()
            .remove_alarm_listener(name, id)
    }

    /// Remove global listener registration `id`.
    /// Returns `false` if there is no such registration.
    pub fn remove_from_global_alarm_listeners(&self, id: ListenerId) -> bool {
        self.shared.listeners.borrow_mut().remove_global_listener(id)
    }

    /// Returns number of listeners of the alarm `name`, not counting global ones.
    pub fn listener_count(&self, name: &str) -> usize {
        self.shared.listeners.borrow().alarm_listener_count(name)
    }

    /// Returns number of global listeners.
    pub fn global_listener_count(&self) -> usize {
        self.shared.listeners.borrow().global_listener_count()
    }
}
