//! Definition of [`ThreadTimer`], which waits for deadlines in the background thread
//! and runs callbacks in the owner thread.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
    sync::mpsc::{self, Receiver, Sender},
    time::Duration,
};

use chrono::{DateTime, Utc};
use timer::{Guard, Timer};

use crate::alarm::error::AlarmError;

use super::timer_primitive::{TickCallback, TimerKind, TimerPrimitive};

/// Token of the timer armed by [`ThreadTimer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThreadTimerToken(u64);

/// Delay used for durations which chrono can not represent.
const FAR_FUTURE_WEEKS: i64 = 52 * 1000;

/// Armed timer of [`ThreadTimer`].
struct ThreadSlot {
    /// Kind the timer was armed with.
    kind: TimerKind,
    /// Dropping the guard cancels the timer in the background thread.
    _guard: Guard,
    /// Taken out while the callback runs.
    callback: Option<TickCallback>,
}

/// State shared by clones of [`ThreadTimer`].
struct ThreadTimerInner {
    /// Owner of the background thread.
    timer: Timer,
    /// Cloned into every scheduled closure to enqueue fired timer ids.
    ticks_sender: Sender<u64>,
    /// Fired timer ids waiting for dispatch.
    ticks_receiver: Receiver<u64>,
    /// Id of the next armed timer.
    next_id: Cell<u64>,
    /// Armed timers by id.
    slots: RefCell<HashMap<u64, ThreadSlot>>,
}

/// Timer which uses background thread of the [`timer`] crate to wait for deadlines.
///
/// Background thread only enqueues fired timers. Callbacks are invoked when the owner calls
/// [`dispatch_pending`][ThreadTimer::dispatch_pending] or
/// [`dispatch_timeout`][ThreadTimer::dispatch_timeout], so they never run
/// concurrently with the scheduler.
///
/// Ticks of the cancelled timer which are already enqueued are ignored.
#[derive(Clone)]
pub struct ThreadTimer {
    /// Shared state.
    inner: Rc<ThreadTimerInner>,
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadTimer {
    /// Create new timer and spawn its background thread.
    pub fn new() -> Self {
        let (ticks_sender, ticks_receiver) = mpsc::channel();
        Self {
            inner: Rc::new(ThreadTimerInner {
                timer: Timer::new(),
                ticks_sender,
                ticks_receiver,
                next_id: Cell::new(0),
                slots: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Returns number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    /// Invoke callbacks of all timers which fired so far, without blocking.
    ///
    /// Returns errors of the ticks which failed.
    pub fn dispatch_pending(&self) -> Vec<AlarmError> {
        let mut failures = Vec::new();
        while let Ok(id) = self.inner.ticks_receiver.try_recv() {
            self.dispatch(id, &mut failures);
        }
        failures
    }

    /// Block until at least one timer fires or `timeout` elapses,
    /// then invoke callbacks of all fired timers.
    ///
    /// Returns errors of the ticks which failed.
    pub fn dispatch_timeout(&self, timeout: Duration) -> Vec<AlarmError> {
        let mut failures = Vec::new();
        // Sender is owned by self, so receiving can only fail by timeout.
        if let Ok(id) = self.inner.ticks_receiver.recv_timeout(timeout) {
            self.dispatch(id, &mut failures);
            failures.extend(self.dispatch_pending());
        }
        failures
    }

    /// Invoke callback of the fired timer `id`, unless it was cancelled.
    fn dispatch(&self, id: u64, failures: &mut Vec<AlarmError>) {
        let taken = self
            .inner
            .slots
            .borrow_mut()
            .get_mut(&id)
            .and_then(|slot| slot.callback.take().map(|callback| (slot.kind, callback)));
        let Some((kind, mut callback)) = taken else {
            log::trace!("Ignoring tick of cancelled timer {}", id);
            return;
        };

        if let Err(err) = callback() {
            failures.push(err);
        }

        let mut slots = self.inner.slots.borrow_mut();
        match kind {
            TimerKind::OneShot => {
                slots.remove(&id);
            }
            TimerKind::Repeating => {
                if let Some(slot) = slots.get_mut(&id) {
                    slot.callback = Some(callback);
                }
            }
        }
    }

    /// Schedule timer of `kind` in the background thread.
    fn arm(&self, kind: TimerKind, delay: Duration, callback: TickCallback) -> ThreadTimerToken {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let delay = chrono::Duration::from_std(delay)
            .unwrap_or_else(|_| chrono::Duration::weeks(FAR_FUTURE_WEEKS));
        let sender = self.inner.ticks_sender.clone();
        let on_fire = move || {
            // Ignore result, because send error means timer has been dropped, which is normal behavior.
            let _ = sender.send(id);
        };

        let guard = match kind {
            TimerKind::OneShot => self.inner.timer.schedule_with_delay(delay, on_fire),
            TimerKind::Repeating => self.inner.timer.schedule_repeating(delay, on_fire),
        };

        self.inner.slots.borrow_mut().insert(
            id,
            ThreadSlot {
                kind,
                _guard: guard,
                callback: Some(callback),
            },
        );

        ThreadTimerToken(id)
    }

    /// Drop the slot of the timer, which cancels it.
    fn cancel(&self, token: ThreadTimerToken) {
        let removed = self.inner.slots.borrow_mut().remove(&token.0);
        if removed.is_none() {
            log::trace!("Timer {:?} is already gone", token);
        }
    }
}

impl TimerPrimitive for ThreadTimer {
    type Token = ThreadTimerToken;

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn after(&self, delay: Duration, callback: TickCallback) -> ThreadTimerToken {
        self.arm(TimerKind::OneShot, delay, callback)
    }

    fn every(&self, period: Duration, callback: TickCallback) -> ThreadTimerToken {
        self.arm(TimerKind::Repeating, period, callback)
    }

    fn cancel_after(&self, token: ThreadTimerToken) {
        self.cancel(token)
    }

    fn cancel_every(&self, token: ThreadTimerToken) {
        self.cancel(token)
    }
}
