use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tokio::task::LocalSet;

use crate::AlarmError;

use super::{
    manual_timer::ManualTimer,
    thread_timer::ThreadTimer,
    timer_primitive::{TickCallback, TimerPrimitive},
    tokio_timer::TokioTimer,
};

fn counting(counter: &Rc<Cell<u32>>) -> TickCallback {
    let counter = counter.clone();
    Box::new(move || {
        counter.set(counter.get() + 1);
        Ok(())
    })
}

fn logging(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> TickCallback {
    let log = log.clone();
    Box::new(move || {
        log.borrow_mut().push(tag);
        Ok(())
    })
}

fn millis(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_manual_timer_order() {
    let timer = ManualTimer::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    timer.after(millis(30), logging(&log, "c"));
    timer.after(millis(10), logging(&log, "a"));
    // Same deadline as "a", but armed later.
    timer.after(millis(10), logging(&log, "b"));

    assert_eq!(timer.next_deadline(), Some(millis(10)));
    assert_eq!(timer.pending_timers(), 3);

    timer.advance(millis(20));
    assert_eq!(*log.borrow(), vec!["a", "b"]);
    assert_eq!(timer.elapsed(), millis(20));

    timer.advance(millis(20));
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    assert_eq!(timer.pending_timers(), 0);
    assert_eq!(timer.next_deadline(), None);
}

#[test]
fn test_manual_timer_clock() {
    let epoch = DateTime::<Utc>::default() + chrono::Duration::days(1);
    let timer = ManualTimer::starting_at(epoch);

    assert_eq!(timer.now(), epoch);
    timer.advance(Duration::from_secs(90));
    assert_eq!(timer.now(), epoch + chrono::Duration::seconds(90));
}

#[test]
fn test_manual_timer_repeating() {
    let timer = ManualTimer::new();
    let counter = Rc::new(Cell::new(0));

    let token = timer.every(millis(10), counting(&counter));

    timer.advance(millis(35));
    assert_eq!(counter.get(), 3);
    assert_eq!(timer.next_deadline(), Some(millis(40)));

    timer.cancel_every(token);
    timer.advance(millis(100));
    assert_eq!(counter.get(), 3);
    assert_eq!(timer.pending_timers(), 0);
}

#[test]
fn test_manual_timer_cancel() {
    let timer = ManualTimer::new();
    let counter = Rc::new(Cell::new(0));

    let token = timer.after(millis(10), counting(&counter));
    timer.after(millis(20), counting(&counter));
    timer.cancel_after(token);
    // Second cancel is a no-op.
    timer.cancel_after(token);

    timer.advance(millis(50));
    assert_eq!(counter.get(), 1);
}

#[test]
fn test_manual_timer_advance_to_next() {
    let timer = ManualTimer::new();
    let counter = Rc::new(Cell::new(0));

    assert!(timer.advance_to_next().is_none());

    timer.after(millis(15), counting(&counter));
    timer.after(millis(40), counting(&counter));

    assert!(timer.advance_to_next().is_some());
    assert_eq!(counter.get(), 1);
    assert_eq!(timer.elapsed(), millis(15));

    assert!(timer.advance_to_next().is_some());
    assert_eq!(counter.get(), 2);
    assert_eq!(timer.elapsed(), millis(40));
}

#[test]
fn test_manual_timer_collects_failures() {
    let timer = ManualTimer::new();
    let counter = Rc::new(Cell::new(0));

    timer.after(millis(10), Box::new(|| Err(AlarmError::MissingTiming)));
    timer.after(millis(20), counting(&counter));

    let failures = timer.advance(millis(30));

    assert_eq!(failures, vec![AlarmError::MissingTiming]);
    assert_eq!(counter.get(), 1);
}

#[test]
fn test_manual_timer_cancel_inside_callback() {
    let timer = ManualTimer::new();
    let counter = Rc::new(Cell::new(0));
    let token = Rc::new(Cell::new(None));

    let timer_clone = timer.clone();
    let counter_clone = counter.clone();
    let token_clone = token.clone();
    let repeating = timer.every(
        millis(10),
        Box::new(move || {
            counter_clone.set(counter_clone.get() + 1);
            if counter_clone.get() == 2 {
                if let Some(token) = token_clone.get() {
                    timer_clone.cancel_every(token);
                }
            }
            Ok(())
        }),
    );
    token.set(Some(repeating));

    timer.advance(millis(100));
    assert_eq!(counter.get(), 2);
    assert_eq!(timer.pending_timers(), 0);
}

#[test]
fn test_manual_timer_arm_inside_callback() {
    let timer = ManualTimer::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let timer_clone = timer.clone();
    let log_clone = log.clone();
    timer.after(
        millis(10),
        Box::new(move || {
            log_clone.borrow_mut().push("outer");
            timer_clone.after(millis(5), logging(&log_clone, "inner"));
            Ok(())
        }),
    );

    timer.advance(millis(15));
    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
}

#[test]
fn test_manual_timer_advance_saturates() {
    let timer = ManualTimer::new();
    let counter = Rc::new(Cell::new(0));

    timer.after(millis(10), counting(&counter));

    assert!(timer.advance(Duration::MAX).is_empty());
    assert_eq!(counter.get(), 1);
    assert_eq!(timer.elapsed(), Duration::MAX);
    assert_eq!(timer.now(), DateTime::<Utc>::MAX_UTC);

    // Clock is already at its end, arming and advancing must not overflow.
    timer.after(millis(10), counting(&counter));
    timer.advance(Duration::from_secs(1));
    assert_eq!(counter.get(), 2);
    assert_eq!(timer.elapsed(), Duration::MAX);
}

#[tokio::test(start_paused = true)]
async fn test_tokio_timer_clock_follows_runtime() {
    let timer = TokioTimer::new();
    let started = timer.now();

    tokio::time::advance(Duration::from_secs(90)).await;
    assert_eq!(timer.now() - started, chrono::Duration::seconds(90));

    tokio::time::sleep(millis(500)).await;
    assert_eq!(timer.now() - started, chrono::Duration::milliseconds(90_500));
}

#[tokio::test(start_paused = true)]
async fn test_tokio_timer() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let timer = TokioTimer::new();
            let once = Rc::new(Cell::new(0));
            let repeating = Rc::new(Cell::new(0));
            let cancelled = Rc::new(Cell::new(0));

            timer.after(millis(1500), counting(&once));
            let token = timer.every(Duration::from_secs(1), counting(&repeating));
            let cancelled_token = timer.after(millis(500), counting(&cancelled));
            timer.cancel_after(cancelled_token);

            tokio::time::sleep(millis(3500)).await;
            assert_eq!(once.get(), 1);
            assert_eq!(repeating.get(), 3);
            assert_eq!(cancelled.get(), 0);

            timer.cancel_every(token);
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(repeating.get(), 3);
        })
        .await;
}

#[test]
fn test_thread_timer() {
    let timer = ThreadTimer::new();
    let once = Rc::new(Cell::new(0));
    let cancelled = Rc::new(Cell::new(0));

    let started = Instant::now();
    timer.after(millis(50), counting(&once));
    let token = timer.after(millis(20), counting(&cancelled));
    timer.cancel_after(token);

    // Callbacks never run without dispatching.
    assert_eq!(once.get(), 0);

    while once.get() == 0 && started.elapsed() < Duration::from_secs(5) {
        assert!(timer.dispatch_timeout(millis(100)).is_empty());
    }

    assert_eq!(once.get(), 1);
    assert_eq!(cancelled.get(), 0);
    assert!(started.elapsed() >= millis(50));
    assert_eq!(timer.pending_timers(), 0);
}

#[test]
fn test_thread_timer_repeating() {
    let timer = ThreadTimer::new();
    let counter = Rc::new(Cell::new(0));

    let started = Instant::now();
    let token = timer.every(millis(10), counting(&counter));

    while counter.get() < 3 && started.elapsed() < Duration::from_secs(5) {
        timer.dispatch_timeout(millis(100));
    }
    assert!(counter.get() >= 3);

    timer.cancel_every(token);
    let fired = counter.get();
    std::thread::sleep(millis(50));
    timer.dispatch_pending();

    // Ticks enqueued before cancel are ignored.
    assert_eq!(counter.get(), fired);
    assert_eq!(timer.pending_timers(), 0);
}
