//! Minimal end-to-end demonstration: build a wheel with the default
//! geometry, enrol a one-shot, a periodic, and a table-driven timer,
//! cancel one of them, and watch the others fire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wheeltime::dispatcher::{DirectDispatcher, QueueDispatcher};
use wheeltime::scheduler::SimpleScheduler;
use wheeltime::timer::Timer;
use wheeltime::TimingWheel;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let scheduler = Arc::new(SimpleScheduler::new(Box::new(QueueDispatcher::new(
        1024,
        Box::new(DirectDispatcher::new()),
    ))));
    let wheel = TimingWheel::default_with_interval(scheduler, Some(Duration::from_millis(100)));
    wheel.start();

    let ticks = Arc::new(AtomicUsize::new(0));
    let t = ticks.clone();
    wheel.interval(Duration::from_millis(300), move || {
        let n = t.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(firing = n, "periodic timer fired");
    });

    let table_timer = Timer::table(&[2, 4, 6], || {
        tracing::info!("table-driven timer fired");
    });
    wheel.add(table_timer);

    let cancel_me = wheel.after(Duration::from_secs(5), || {
        tracing::warn!("this callback should never run");
    });
    if let Some(handle) = cancel_me {
        wheel.cancel(handle);
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    wheel.stop();
    wheel.wait().await;

    println!("observed {} tick(s) over the wheel's lifetime", wheel.count());
    println!("periodic timer fired {} time(s)", ticks.load(Ordering::SeqCst));
}
