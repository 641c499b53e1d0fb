//! Throughput benchmarks for the hierarchical timing wheel: enrolment and
//! tick/cascade cost as a function of the number of pending timers.
//!
//! Run with `cargo bench`. These do not assert O(1) behavior numerically;
//! they exist to catch regressions in a profile across geometry and load.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wheeltime::dispatcher::DirectDispatcher;
use wheeltime::scheduler::SimpleScheduler;
use wheeltime::TimingWheel;

fn build_wheel() -> TimingWheel {
    let scheduler = Arc::new(SimpleScheduler::new(Box::new(DirectDispatcher::new())));
    TimingWheel::new(scheduler, 4096, Duration::from_millis(1), &[64, 64, 128, 256]).unwrap()
}

fn bench_enrolment(c: &mut Criterion) {
    let mut group = c.benchmark_group("enrolment");

    for &timer_count in &[1_000usize, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("after", timer_count), &timer_count, |b, &count| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            b.iter(|| {
                rt.block_on(async {
                    let wheel = build_wheel();
                    wheel.start();
                    for i in 0..count {
                        black_box(wheel.after(Duration::from_millis(1 + (i % 5_000) as u64), || {}));
                    }
                    wheel.stop();
                    wheel.wait().await;
                });
            });
        });
    }

    group.finish();
}

fn bench_tick_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_cascade");

    for &timer_count in &[1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("ticks_under_load", timer_count), &timer_count, |b, &count| {
            // `tokio::time::pause()` only works on a current-thread runtime;
            // `Runtime::new()` always builds the multi-thread scheduler.
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            b.iter(|| {
                rt.block_on(async {
                    tokio::time::pause();
                    let scheduler = Arc::new(SimpleScheduler::new(Box::new(DirectDispatcher::new())));
                    let wheel = TimingWheel::new(scheduler, 4096, Duration::from_millis(1), &[64, 64, 128, 256]).unwrap();
                    wheel.start();
                    for i in 0..count {
                        wheel.after(Duration::from_millis(1 + (i % 8_000) as u64), || {});
                    }
                    tokio::time::advance(Duration::from_secs(9)).await;
                    for _ in 0..4 {
                        tokio::task::yield_now().await;
                    }
                    wheel.stop();
                    wheel.wait().await;
                    black_box(wheel.count());
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_enrolment, bench_tick_cascade);
criterion_main!(benches);
