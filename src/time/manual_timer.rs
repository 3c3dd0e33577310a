//! Definition of [`ManualTimer`], which is a deterministic timer driven by virtual time.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    rc::Rc,
    time::Duration,
};

use chrono::{DateTime, Utc};

use crate::alarm::error::AlarmError;

use super::timer_primitive::{TickCallback, TimerKind, TimerPrimitive};

/// Token of the timer armed by [`ManualTimer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ManualTimerToken(u64);

/// Position of the pending timer in the queue: deadline and arming sequence number.
type QueueKey = (Duration, u64);

/// Armed timer of [`ManualTimer`].
struct ManualSlot {
    /// Kind the timer was armed with.
    kind: TimerKind,
    /// Delay of one-shot timer or period of repeating one.
    period: Duration,
    /// Position in the queue, `None` while the callback runs.
    key: Option<QueueKey>,
    /// Taken out while the callback runs.
    callback: Option<TickCallback>,
}

/// State shared by clones of [`ManualTimer`].
struct ManualTimerState {
    /// Wall-clock time at zero elapsed time.
    epoch: DateTime<Utc>,
    /// Virtual time elapsed since the creation.
    elapsed: Duration,
    /// Id of the next armed timer.
    next_id: u64,
    /// Sequence number of the next queued deadline.
    next_seq: u64,
    /// Pending deadlines mapped to timer ids.
    queue: BTreeMap<QueueKey, u64>,
    /// Armed timers by id.
    slots: HashMap<u64, ManualSlot>,
}

impl ManualTimerState {
    /// Put timer `id` to the queue with `deadline`.
    fn enqueue(&mut self, id: u64, deadline: Duration) -> QueueKey {
        let key = (deadline, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, id);
        key
    }

    /// Returns epoch moved forward by the elapsed time.
    fn now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.elapsed)
            .ok()
            .and_then(|elapsed| self.epoch.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Pops the earliest timer due not later than `target` and moves the clock to its deadline.
    fn pop_due(&mut self, target: Duration) -> Option<(u64, TickCallback)> {
        loop {
            let (&key, &id) = self.queue.iter().next()?;
            if key.0 > target {
                return None;
            }
            self.queue.remove(&key);
            self.elapsed = self.elapsed.max(key.0);

            let Some(slot) = self.slots.get_mut(&id) else {
                continue;
            };
            slot.key = None;
            if let Some(callback) = slot.callback.take() {
                return Some((id, callback));
            }
        }
    }

    /// Returns the callback to the slot after it was invoked.
    fn restore(&mut self, id: u64, callback: TickCallback) {
        let Some(slot) = self.slots.get(&id) else {
            // Cancelled inside of its own callback.
            return;
        };
        match slot.kind {
            TimerKind::OneShot => {
                self.slots.remove(&id);
            }
            TimerKind::Repeating => {
                let deadline = self.elapsed.saturating_add(slot.period);
                let key = self.enqueue(id, deadline);
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.key = Some(key);
                    slot.callback = Some(callback);
                }
            }
        }
    }
}

/// Timer which never fires by itself.
///
/// Time only moves forward when user calls [`advance`][ManualTimer::advance]
/// or [`advance_to_next`][ManualTimer::advance_to_next]. Timers which become
/// due are fired in the order of their deadlines, and timers with equal
/// deadlines are fired in the order they were armed.
///
/// [`ManualTimer`] is a cheap handle: clones share the same clock and queue,
/// so user can keep one clone and pass the other one to [`crate::AlarmScheduler`].
#[derive(Clone)]
pub struct ManualTimer {
    /// Shared clock and queue.
    state: Rc<RefCell<ManualTimerState>>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimer {
    /// Create new timer with clock starting at the Unix epoch.
    pub fn new() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }

    /// Create new timer with clock starting at `epoch`.
    pub fn starting_at(epoch: DateTime<Utc>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ManualTimerState {
                epoch,
                elapsed: Duration::ZERO,
                next_id: 0,
                next_seq: 0,
                queue: BTreeMap::new(),
                slots: HashMap::new(),
            })),
        }
    }

    /// Returns virtual time elapsed since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.state.borrow().elapsed
    }

    /// Returns number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().slots.len()
    }

    /// Returns time of the earliest pending fire, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state
            .borrow()
            .queue
            .keys()
            .next()
            .map(|(deadline, _)| *deadline)
    }

    /// Move clock forward by `by`, firing every timer which becomes due.
    ///
    /// Returns errors of the ticks which failed. Failed tick does not stop other timers.
    pub fn advance(&self, by: Duration) -> Vec<AlarmError> {
        let target = self.state.borrow().elapsed.saturating_add(by);
        let mut failures = Vec::new();

        loop {
            // State must not be borrowed while callback runs,
            // because callback can arm and cancel timers.
            let Some((id, mut callback)) = self.state.borrow_mut().pop_due(target) else {
                break;
            };
            if let Err(err) = callback() {
                failures.push(err);
            }
            self.state.borrow_mut().restore(id, callback);
        }

        let mut state = self.state.borrow_mut();
        state.elapsed = state.elapsed.max(target);

        failures
    }

    /// Move clock to the earliest pending deadline and fire timers due at it.
    ///
    /// Returns `None` if there are no pending timers.
    pub fn advance_to_next(&self) -> Option<Vec<AlarmError>> {
        let deadline = self.next_deadline()?;
        let elapsed = self.elapsed();
        Some(self.advance(deadline.saturating_sub(elapsed)))
    }

    /// Arm timer of `kind` which is due after `period`.
    fn arm(&self, kind: TimerKind, period: Duration, callback: TickCallback) -> ManualTimerToken {
        // Zero period would make repeating timer fire forever inside of one advance.
        let period = period.max(Duration::from_nanos(1));

        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;

        let deadline = state.elapsed.saturating_add(period);
        let key = state.enqueue(id, deadline);
        state.slots.insert(
            id,
            ManualSlot {
                kind,
                period,
                key: Some(key),
                callback: Some(callback),
            },
        );

        ManualTimerToken(id)
    }

    /// Cancel timer if it is still armed.
    fn cancel(&self, token: ManualTimerToken, kind: TimerKind) {
        let mut state = self.state.borrow_mut();
        let Some(slot) = state.slots.remove(&token.0) else {
            return;
        };
        if slot.kind != kind {
            log::warn!(
                "Timer {:?} was armed as {:?}, but cancelled as {:?}",
                token,
                slot.kind,
                kind
            );
        }
        if let Some(key) = slot.key {
            state.queue.remove(&key);
        }
    }
}

impl TimerPrimitive for ManualTimer {
    type Token = ManualTimerToken;

    fn now(&self) -> DateTime<Utc> {
        self.state.borrow().now()
    }

    fn after(&self, delay: Duration, callback: TickCallback) -> ManualTimerToken {
        self.arm(TimerKind::OneShot, delay, callback)
    }

    fn every(&self, period: Duration, callback: TickCallback) -> ManualTimerToken {
        self.arm(TimerKind::Repeating, period, callback)
    }

    fn cancel_after(&self, token: ManualTimerToken) {
        self.cancel(token, TimerKind::OneShot)
    }

    fn cancel_every(&self, token: ManualTimerToken) {
        self.cancel(token, TimerKind::Repeating)
    }
}
