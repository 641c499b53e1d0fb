//! # wheeltime: a hierarchical timing wheel
//!
//! `wheeltime` schedules large numbers of time-based callbacks — one-shot,
//! deadline, periodic, and table-driven — with O(1) amortized insertion,
//! cancellation, and expiration, independent of how far out a timer's
//! deadline sits. It trades the `O(log n)` per-operation cost of a binary
//! heap for a small number of bounded slot arrays ("levels") arranged in
//! cascading resolution: the finest level fires every tick, coarser levels
//! fire less often and "cascade" their contents down a level at a time as
//! the clock advances.
//!
//! This is the classic design from Varghese & Lauck, "Hashed and
//! Hierarchical Timing Wheels" (1996), implemented here as:
//!
//! - an intrusive, arena-backed doubly-linked slot list ([`slot`]) so
//!   enrolling a timer costs one arena insertion, not a heap allocation;
//! - a fixed power-of-two [`wheel`] level with a rotating cursor;
//! - a single-threaded worker ([`timing`]) that owns the wheel's arena and
//!   levels outright and serializes every enrolment, cancellation, and
//!   tick through one request channel — no locks inside the wheel itself;
//! - a pluggable [`dispatcher`] tree and [`scheduler`] that decouple
//!   callback execution from the tick loop, so a slow callback backpressures
//!   through its own queue rather than stalling the clock.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wheeltime::dispatcher::{DirectDispatcher, QueueDispatcher};
//! use wheeltime::scheduler::SimpleScheduler;
//! use wheeltime::TimingWheel;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let scheduler = Arc::new(SimpleScheduler::new(Box::new(QueueDispatcher::new(
//!     1024,
//!     Box::new(DirectDispatcher::new()),
//! ))));
//! let wheel = TimingWheel::default_with_interval(scheduler, None);
//! wheel.start();
//!
//! wheel.after(Duration::from_secs(1), || println!("fired"));
//! # wheel.stop();
//! # }
//! ```
//!
//! ## Non-goals
//!
//! No persistence, no cross-process coordination, no timer priorities
//! beyond insertion order within a slot, no sub-tick precision (timers
//! fire on the first tick boundary at or after their deadline), no
//! fairness guarantees between dispatchers, no dynamic reconfiguration of
//! wheel geometry after construction.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![allow(clippy::type_complexity)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod scheduler;
mod slot;
pub mod timer;
pub mod timing;
mod wheel;

pub use config::WheelConfig;
pub use error::{Error, Result};
pub use metrics::WheelMetrics;
pub use timer::{Callback, CompletionPolicy, Timer, TimerHandle};
pub use timing::TimingWheel;
