//! Lightweight atomic counters for the four countable transitions the
//! core invariants reference: ticks observed, timers enrolled, timers
//! fired-and-terminated, timers cancelled-and-processed.
//!
//! Hand-rolled atomics rather than a metrics crate dependency, matching
//! the teacher crate's own approach to counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cloneable, `Arc`-backed counter set. Every clone observes the same
/// underlying counters.
#[derive(Debug, Clone, Default)]
pub struct WheelMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    enrolled: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
    cascaded: AtomicU64,
}

impl WheelMetrics {
    /// Build a fresh, zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_tick(&self) {
        self.inner.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enrolled(&self) {
        self.inner.enrolled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fired(&self) {
        self.inner.fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.inner.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cascaded(&self) {
        self.inner.cascaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Ticks the worker has processed since construction.
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    /// Timers successfully enrolled (after validation).
    pub fn enrolled(&self) -> u64 {
        self.inner.enrolled.load(Ordering::Relaxed)
    }

    /// Timers that reached a terminal firing (policy returned zero).
    pub fn fired(&self) -> u64 {
        self.inner.fired.load(Ordering::Relaxed)
    }

    /// Cancellation requests processed by the worker.
    pub fn cancelled(&self) -> u64 {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Timers moved one level down during a cascade.
    pub fn cascaded(&self) -> u64 {
        self.inner.cascaded.load(Ordering::Relaxed)
    }
}
