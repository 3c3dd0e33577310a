use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use alarmist::{
    AlarmConfig, AlarmError, AlarmScheduler, AlarmSnapshot, ManualTimer, SchedulerConfig,
    ThreadTimer, TimerPrimitive, TokioTimer,
};
use tokio::task::LocalSet;

fn init_log() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

type Events = Rc<RefCell<Vec<String>>>;

fn listener(events: &Events, tag: &str) -> impl Fn(&AlarmSnapshot) -> Result<(), String> + 'static {
    let events = events.clone();
    let tag = tag.to_owned();
    move |alarm| {
        events.borrow_mut().push(format!("{}:{}", tag, alarm.name));
        Ok(())
    }
}

#[test]
fn alarms_in_simulation() {
    init_log();

    let timer = ManualTimer::new();
    let scheduler = AlarmScheduler::with_timer(timer.clone());
    let events = Events::default();

    scheduler.listen_to_all_alarms(listener(&events, "all"));
    scheduler
        .listen_to_alarm("heartbeat", listener(&events, "hb"))
        .unwrap();

    scheduler
        .create_alarm("heartbeat", AlarmConfig::repeating(10.0))
        .unwrap();
    scheduler
        .create_alarm("reminder", AlarmConfig::once(25.0))
        .unwrap();
    assert_eq!(scheduler.get_all_alarms().len(), 2);

    // Heartbeat at 10 and 20.
    timer.advance(Duration::from_secs(20));
    assert_eq!(
        *events.borrow(),
        vec!["hb:heartbeat", "all:heartbeat", "hb:heartbeat", "all:heartbeat"]
    );
    events.borrow_mut().clear();

    // Reminder at 25, heartbeat at 30.
    timer.advance(Duration::from_secs(10));
    assert_eq!(
        *events.borrow(),
        vec!["all:reminder", "hb:heartbeat", "all:heartbeat"]
    );
    events.borrow_mut().clear();

    assert!(!scheduler.get_alarm("reminder").unwrap().is_scheduled());
    assert!(scheduler.get_alarm("heartbeat").unwrap().is_scheduled());

    assert!(scheduler.clear_alarm("heartbeat"));
    assert!(!scheduler.clear_alarm("heartbeat"));
    timer.advance(Duration::from_secs(100));
    assert!(events.borrow().is_empty());
}

#[test]
fn independent_schedulers() {
    let timer = ManualTimer::new();
    let first = AlarmScheduler::with_timer(timer.clone());
    let second = AlarmScheduler::new(
        timer.clone(),
        SchedulerConfig::new(Duration::from_millis(1)).unwrap(),
    );
    let events = Events::default();

    first.listen_to_all_alarms(listener(&events, "first"));
    second.listen_to_all_alarms(listener(&events, "second"));

    first.create_alarm("x", AlarmConfig::once(1.0)).unwrap();
    second.create_alarm("x", AlarmConfig::once(1.0)).unwrap();

    timer.advance(Duration::from_millis(1));
    assert_eq!(*events.borrow(), vec!["second:x"]);

    first.clear_all_alarms();
    assert!(first.is_empty());
    assert_eq!(second.len(), 1);

    timer.advance(Duration::from_secs(1));
    assert_eq!(*events.borrow(), vec!["second:x"]);
}

#[test]
fn handler_error_reaches_timer() {
    let timer = ManualTimer::new();
    let scheduler = AlarmScheduler::with_timer(timer.clone());

    scheduler.listen_to_all_alarms(|alarm: &AlarmSnapshot| {
        if alarm.name == "bad" {
            Err("bad alarm".to_owned())
        } else {
            Ok(())
        }
    });
    scheduler.create_alarm("bad", AlarmConfig::repeating(1.0)).unwrap();
    scheduler.create_alarm("good", AlarmConfig::repeating(1.0)).unwrap();

    let failures = timer.advance(Duration::from_secs(3));

    assert_eq!(failures.len(), 3);
    for failure in &failures {
        assert!(matches!(failure, AlarmError::Handler { alarm, .. } if alarm == "bad"));
    }
    assert!(scheduler.has_fired("good"));
    // Failing alarm keeps repeating.
    assert!(scheduler.get_alarm("bad").unwrap().is_scheduled());
}

#[tokio::test(start_paused = true)]
async fn alarms_on_tokio() {
    init_log();

    let local = LocalSet::new();
    local
        .run_until(async {
            let scheduler = AlarmScheduler::with_timer(TokioTimer::new());
            let events = Events::default();

            scheduler
                .listen_to_alarm("tick", listener(&events, "tick"))
                .unwrap();
            scheduler
                .listen_to_alarm("once", listener(&events, "once"))
                .unwrap();

            scheduler
                .create_alarm("tick", AlarmConfig::repeating(1.0))
                .unwrap();
            scheduler
                .create_alarm("once", AlarmConfig::once(2.5))
                .unwrap();
            // Overwrite must leave single pending timer.
            scheduler
                .create_alarm("once", AlarmConfig::once(2.5))
                .unwrap();

            tokio::time::sleep(Duration::from_millis(3200)).await;
            assert_eq!(
                *events.borrow(),
                vec!["tick:tick", "tick:tick", "once:once", "tick:tick"]
            );

            scheduler.clear_all_alarms();
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(events.borrow().len(), 4);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn tokio_schedule_moves_by_period() {
    init_log();

    let local = LocalSet::new();
    local
        .run_until(async {
            let scheduler = AlarmScheduler::with_timer(TokioTimer::new());
            let fired_at = Rc::new(RefCell::new(Vec::new()));

            let fired_at_clone = fired_at.clone();
            scheduler
                .listen_to_alarm("tick", move |alarm: &AlarmSnapshot| {
                    fired_at_clone.borrow_mut().push(alarm.scheduled_time);
                    Ok(())
                })
                .unwrap();

            let created = scheduler
                .create_alarm("tick", AlarmConfig::repeating(10.0))
                .unwrap();
            let first = created.scheduled_time.unwrap();
            assert_eq!(
                first - scheduler.timer().now(),
                chrono::Duration::seconds(10)
            );

            tokio::time::sleep(Duration::from_millis(10_500)).await;
            let second = scheduler.get_alarm("tick").unwrap().scheduled_time.unwrap();
            assert_eq!(second - first, chrono::Duration::seconds(10));
            // Listener sees the time of the fire it is notified about.
            assert_eq!(*fired_at.borrow(), vec![Some(first)]);

            tokio::time::sleep(Duration::from_secs(10)).await;
            let third = scheduler.get_alarm("tick").unwrap().scheduled_time.unwrap();
            assert_eq!(third - second, chrono::Duration::seconds(10));

            scheduler.clear_all_alarms();
        })
        .await;
}

#[test]
fn alarms_on_thread_timer() {
    init_log();

    let timer = ThreadTimer::new();
    let scheduler = AlarmScheduler::new(
        timer.clone(),
        SchedulerConfig::new(Duration::from_millis(10)).unwrap(),
    );
    let events = Events::default();

    scheduler.listen_to_all_alarms(listener(&events, "all"));
    scheduler.create_alarm("soon", AlarmConfig::once(3.0)).unwrap();
    scheduler.create_alarm("never", AlarmConfig::once(5.0)).unwrap();
    assert!(scheduler.clear_alarm("never"));

    let started = Instant::now();
    while events.borrow().is_empty() && started.elapsed() < Duration::from_secs(5) {
        assert!(timer.dispatch_timeout(Duration::from_millis(100)).is_empty());
    }

    std::thread::sleep(Duration::from_millis(100));
    timer.dispatch_pending();

    assert_eq!(*events.borrow(), vec!["all:soon"]);
    assert_eq!(timer.pending_timers(), 0);
}
