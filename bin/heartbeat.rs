//! Heartbeat executor.

use std::{cell::Cell, rc::Rc, time::Duration};

use alarmist::{AlarmConfig, AlarmScheduler, AlarmSnapshot, TokioTimer};
use log::info;
use tokio::task::LocalSet;

/// Accepts arguments from the command line.
/// * period - heartbeat period in seconds
/// * stop_after - number of seconds after which heartbeat stops
fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    // Parse command line arguments.
    let args = std::env::args().collect::<Vec<String>>();
    if args.len() < 3 {
        println!("Usage: {} <period> <stop_after>", args[0]);
        return;
    }

    let period = args[1].parse::<f64>().expect("Can not parse period");
    let stop_after = args[2].parse::<f64>().expect("Can not parse stop_after");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("Can not create tokio runtime");

    LocalSet::new().block_on(&runtime, async move {
        let scheduler = AlarmScheduler::with_timer(TokioTimer::new());
        let stopped = Rc::new(Cell::new(false));

        scheduler.listen_to_all_alarms(|alarm: &AlarmSnapshot| {
            info!("Alarm '{}' fired, next at {:?}", alarm.name, alarm.scheduled_time);
            Ok(())
        });

        let stopped_clone = stopped.clone();
        scheduler
            .listen_to_alarm("stop", move |_: &AlarmSnapshot| {
                stopped_clone.set(true);
                Ok(())
            })
            .expect("Can not listen to stop alarm");

        scheduler
            .create_alarm("heartbeat", AlarmConfig::repeating(period))
            .expect("Can not create heartbeat alarm");
        scheduler
            .create_alarm("stop", AlarmConfig::once(stop_after))
            .expect("Can not create stop alarm");

        while !stopped.get() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        scheduler.clear_all_alarms();
        info!("Heartbeat stopped");
    });
}
