//! The hierarchical timing wheel itself: tick loop, request channel,
//! cascade, and lifecycle.
//!
//! The worker task is the sole owner of the wheel's arena and levels
//! (§5's single-writer model); everything external — enrolment,
//! cancellation, start/stop — crosses a bounded [`tokio::sync::mpsc`]
//! channel instead of a lock, following the teacher crate's own
//! preference for channel-based coordination over shared mutexes in its
//! async paths.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slotmap::SlotMap;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::metrics::WheelMetrics;
use crate::scheduler::Scheduler;
use crate::timer::{Timer, TimerHandle, TimerKey, TimerRecord};
use crate::wheel::WheelLevel;

type Arena = SlotMap<TimerKey, TimerRecord>;

const STATE_NEW: i32 = 0;
const STATE_RUNNING: i32 = 1;
const STATE_STOPPED: i32 = 2;

enum Operation {
    After(TimerHandle, Timer),
    At(TimerHandle, Timer, Instant),
    Remove(TimerHandle),
}

/// A hierarchical timing wheel scheduling one-shot, deadline, periodic,
/// and table-driven callbacks.
///
/// Construct with [`TimingWheel::new`] or [`TimingWheel::default`], call
/// [`TimingWheel::start`] once, enrol timers with [`TimingWheel::after`]
/// / [`TimingWheel::at`] / [`TimingWheel::interval`] / [`TimingWheel::add`],
/// and [`TimingWheel::stop`] (or let every handle drop) to wind down. Use
/// [`TimingWheel::wait`] to block until the worker has fully exited.
pub struct TimingWheel {
    interval: Duration,
    level_sizes: Vec<usize>,
    request_tx: mpsc::Sender<Operation>,
    request_rx_taker: std::sync::Mutex<Option<mpsc::Receiver<Operation>>>,
    scheduler: Arc<dyn Scheduler>,
    state: AtomicI32,
    tick_count: Arc<AtomicI64>,
    next_handle: AtomicU64,
    metrics: WheelMetrics,
    quit_tx: watch::Sender<bool>,
    quit_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
}

impl TimingWheel {
    /// Build a wheel over the given `scheduler`, with a request channel
    /// bounded at `request_capacity`, ticking every `interval`, with one
    /// wheel level per entry of `level_sizes` (finest first). Every
    /// entry of `level_sizes` must be a power of two, and `level_sizes`
    /// itself must have a power-of-two length (the cascade cursor-carry
    /// logic masks across levels the same way a single level masks
    /// across slots).
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        request_capacity: usize,
        interval: Duration,
        level_sizes: &[usize],
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::config("interval must be positive"));
        }
        if request_capacity == 0 {
            return Err(Error::config("request_capacity must be positive"));
        }
        let length = level_sizes.len();
        if length == 0 || !length.is_power_of_two() {
            return Err(Error::config(format!(
                "level count {length} is not a power of two"
            )));
        }

        let (request_tx, request_rx) = mpsc::channel(request_capacity);
        let (quit_tx, quit_rx) = watch::channel(false);
        let (stop_tx, _stop_rx) = watch::channel(false);

        Ok(Self {
            interval,
            level_sizes: level_sizes.to_vec(),
            request_tx,
            request_rx_taker: std::sync::Mutex::new(Some(request_rx)),
            scheduler,
            state: AtomicI32::new(STATE_NEW),
            tick_count: Arc::new(AtomicI64::new(0)),
            next_handle: AtomicU64::new(1),
            metrics: WheelMetrics::new(),
            quit_tx,
            quit_rx,
            stop_tx,
        })
    }

    /// A wheel with the teacher's original default geometry: levels of
    /// 64/64/128/256 slots, a 1024-deep request channel, ticking at
    /// `interval` (default one second if `None`).
    pub fn default_with_interval(
        scheduler: Arc<dyn Scheduler>,
        interval: Option<Duration>,
    ) -> Self {
        Self::new(
            scheduler,
            1024,
            interval.unwrap_or(Duration::from_secs(1)),
            &[64, 64, 128, 256],
        )
        .expect("default geometry is always valid")
    }

    /// Metrics handle for this wheel. Clonable; every clone observes the
    /// same counters.
    pub fn metrics(&self) -> WheelMetrics {
        self.metrics.clone()
    }

    /// Total ticks observed since construction.
    pub fn count(&self) -> i64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    /// Start the worker task. The wheel's lifecycle only ever moves
    /// forward (`New -> Running -> Stopped`); a second call is a fatal
    /// lifecycle error (§5, §7) and halts the caller, unlike `stop`, whose
    /// duplicate calls are silent.
    ///
    /// # Panics
    /// Panics if called more than once.
    pub fn start(&self) {
        if self
            .state
            .compare_exchange(STATE_NEW, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = Error::lifecycle("TimingWheel::start called more than once");
            error!("{err}");
            panic!("{err}");
        }

        self.scheduler.start();

        let request_rx = self
            .request_rx_taker
            .lock()
            .expect("request receiver mutex poisoned")
            .take()
            .expect("start() called exactly once after a successful CAS");

        let worker = Worker {
            interval: self.interval,
            levels: self
                .level_sizes
                .iter()
                .map(|&size| WheelLevel::new(size).expect("validated at construction"))
                .collect(),
            levels_mask: self.level_sizes.len() - 1,
            arena: Arena::default(),
            ids: std::collections::HashMap::new(),
            scheduler: self.scheduler.clone(),
            tick_count: self.tick_count.clone(),
            metrics: self.metrics.clone(),
            quit_tx: self.quit_tx.clone(),
            stop_rx: self.stop_tx.subscribe(),
        };

        tokio::spawn(worker.run(request_rx));
        debug!(interval = ?self.interval, levels = ?self.level_sizes, "timing wheel started");
    }

    /// Signal the worker to stop. Idempotent: a call before `start`, or a
    /// second call after the first, is silently ignored. Callbacks
    /// already handed to the scheduler may still run to completion.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(STATE_RUNNING, STATE_STOPPED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let _ = self.stop_tx.send(true);
        self.scheduler.stop();
        debug!("timing wheel stop requested");
    }

    /// Block until the worker has fully exited (after `stop`, or the
    /// request channel closing because every handle was dropped).
    pub async fn wait(&self) {
        let mut rx = self.quit_rx.clone();
        let _ = rx.changed().await;
    }

    fn next_handle(&self) -> TimerHandle {
        TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn calc(&self, duration: Duration, rearm: i64) -> i64 {
        let ticks = duration.as_nanos() / self.interval.as_nanos().max(1);
        if ticks == 0 {
            rearm
        } else {
            ticks as i64
        }
    }

    fn push(&self, op: Operation) -> bool {
        match self.request_tx.try_send(op) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "timing wheel request channel rejected enrolment");
                false
            }
        }
    }

    /// Enrol a one-shot timer firing after `duration`. Returns `None`
    /// without enqueueing anything if `duration` is non-positive.
    pub fn after<F>(&self, duration: Duration, callback: F) -> Option<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.after_interval_raw(duration, 0, callback)
    }

    /// Enrol a timer firing after `duration`, then rearming every
    /// `interval` thereafter.
    pub fn after_interval<F>(
        &self,
        duration: Duration,
        interval: Duration,
        callback: F,
    ) -> Option<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let value = self.calc(interval, 1);
        self.after_interval_raw(duration, value, callback)
    }

    /// Enrol a timer that fires every `interval`, starting one interval
    /// from now.
    pub fn interval<F>(&self, interval: Duration, callback: F) -> Option<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let value = self.calc(interval, 1);
        self.after_interval_raw(interval, value, callback)
    }

    fn after_interval_raw<F>(&self, duration: Duration, value: i64, callback: F) -> Option<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if duration.is_zero() {
            return None;
        }
        let count = self.calc(duration, value);
        let handle = self.next_handle();
        let timer = Timer::periodic(count, value, callback);
        if self.push(Operation::After(handle, timer)) {
            Some(handle)
        } else {
            None
        }
    }

    /// Enrol a one-shot timer firing at absolute `deadline`. Returns
    /// `None` if `deadline` is already in the past by the time the
    /// worker processes the request... no: like the teacher's
    /// `time.Time.IsZero` check, only an explicitly zero-value deadline
    /// is rejected; a `deadline` already in the past fires on the very
    /// next tick (matching `insertTimer`'s `count <= 0` immediate-fire
    /// path).
    pub fn at<F>(&self, deadline: Instant, callback: F) -> Option<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.at_interval_raw(deadline, 0, callback)
    }

    /// Enrol a timer firing at absolute `deadline`, then rearming every
    /// `interval` thereafter.
    pub fn at_interval<F>(
        &self,
        deadline: Instant,
        interval: Duration,
        callback: F,
    ) -> Option<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let value = self.calc(interval, 1);
        self.at_interval_raw(deadline, value, callback)
    }

    fn at_interval_raw<F>(&self, deadline: Instant, value: i64, callback: F) -> Option<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = self.next_handle();
        let timer = Timer::periodic(0, value, callback);
        if self.push(Operation::At(handle, timer, deadline)) {
            Some(handle)
        } else {
            None
        }
    }

    /// Enrol a fully custom [`Timer`] (a table schedule, a bounded
    /// repeat count, or a caller-supplied completion policy).
    pub fn add(&self, timer: Timer) -> Option<TimerHandle> {
        let handle = self.next_handle();
        if self.push(Operation::After(handle, timer)) {
            Some(handle)
        } else {
            None
        }
    }

    /// Cancel a previously enrolled timer. Race-free: a cancellation
    /// processed before the timer's firing tick prevents it from ever
    /// firing; one processed after firing-and-dispatch cannot un-invoke
    /// the callback, but the callback itself is already inert by the
    /// time it runs (see [`crate::timer::TimerRecord::cancel`]).
    pub fn cancel(&self, handle: TimerHandle) {
        let _ = self.push(Operation::Remove(handle));
    }
}

struct Worker {
    interval: Duration,
    levels: Vec<WheelLevel>,
    levels_mask: usize,
    arena: Arena,
    ids: std::collections::HashMap<u64, TimerKey>,
    scheduler: Arc<dyn Scheduler>,
    tick_count: Arc<AtomicI64>,
    metrics: WheelMetrics,
    quit_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self, mut request_rx: mpsc::Receiver<Operation>) {
        // Drain any requests already queued before the first tick, the
        // same non-blocking catch-up the original source's `join` does
        // before entering the ticking loop.
        while let Ok(op) = request_rx.try_recv() {
            self.do_request(op);
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step();
                }
                op = request_rx.recv() => {
                    match op {
                        Some(op) => self.do_request(op),
                        None => break,
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_ok() && *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        trace!("timing wheel worker exiting");
        let _ = self.quit_tx.send(true);
    }

    fn do_request(&mut self, op: Operation) {
        match op {
            Operation::Remove(handle) => self.remove(handle),
            Operation::At(handle, mut timer, deadline) => {
                let now = Instant::now();
                let remaining = deadline.saturating_duration_since(now).as_nanos();
                let interval_nanos = self.interval.as_nanos().max(1);
                timer.count = (remaining / interval_nanos) as i64;
                self.enrol(handle, timer);
            }
            Operation::After(handle, timer) => self.enrol(handle, timer),
        }
    }

    fn enrol(&mut self, handle: TimerHandle, timer: Timer) {
        let record = TimerRecord::new(handle, timer);
        let key = self.arena.insert(record);
        self.ids.insert(handle.0, key);
        self.metrics.record_enrolled();
        trace!(handle = handle.0, "timer enrolled");
        self.insert_timer(key);
    }

    fn remove(&mut self, handle: TimerHandle) {
        let Some(key) = self.ids.remove(&handle.0) else {
            trace!(handle = handle.0, "cancel of unknown or already-fired handle ignored");
            return;
        };
        if let Some(record) = self.arena.get_mut(key) {
            record.cancel();
            if let Some(slot_ref) = record.slot_ref {
                self.levels[slot_ref.level].remove_at(&mut self.arena, slot_ref.index, key);
            }
        }
        self.arena.remove(key);
        self.metrics.record_cancelled();
        trace!(handle = handle.0, "timer cancelled");
    }

    /// Advance the clock by one tick, cascading every level whose cursor
    /// wraps, exactly mirroring the original source's carry-propagation
    /// loop: level 0 always steps; level `i+1` steps only when level `i`'s
    /// cursor just wrapped to zero.
    fn step(&mut self) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_tick();

        let mut i = 0usize;
        let mut l = 0usize;
        while i <= l {
            let index = self.levels[i].step();
            if index == 0 {
                l = (l + 1) & self.levels_mask;
            }
            if let Some(slot) = self.levels[i].take_slot(index) {
                if !slot.is_empty() {
                    self.metrics.record_cascaded();
                    self.insert_slot(slot);
                }
            }
            i += 1;
        }
    }

    /// Re-place every timer that was sitting in a drained slot, head to
    /// tail — §5 ordering guarantee 3 ("within a slot from head to tail")
    /// and §4.4's drain-and-reinsert both require insertion order, exactly
    /// as the original source's `insertSlot` walks `Front()` then `.next`.
    /// Bounded by the slot's own length rather than the original's
    /// tail-pointer severing trick, since `Slot::pop_front` already yields
    /// each member exactly once.
    fn insert_slot(&mut self, mut slot: crate::slot::Slot) {
        for _ in 0..slot.len() {
            if let Some(key) = slot.pop_front(&mut self.arena) {
                self.insert_timer(key);
            }
        }
    }

    /// Fire-or-place a single timer: if its countdown has already
    /// reached zero, hand it to the scheduler and consult its completion
    /// policy for the next countdown (terminating if that's zero too);
    /// otherwise bit-slice the remaining countdown across levels to find
    /// its placement.
    fn insert_timer(&mut self, key: TimerKey) {
        let count = self.arena[key].count;
        if count <= 0 {
            let cell = self.arena[key].callback_cell();
            self.scheduler.schedule(Arc::new(move || {
                let callback = cell.lock().expect("callback cell poisoned").clone();
                callback();
            }));

            let value = self.arena[key].value;
            let next = self.arena[key].policy.complete(value);
            self.arena[key].count = next;
            if next <= 0 {
                // §8's invariant defines "fired" as fired-and-terminated
                // (completion policy returned 0); a rearmed periodic/table/
                // bounded-repeat firing doesn't count here.
                self.metrics.record_fired();
                self.ids.remove(&self.arena[key].handle.0);
                self.arena.remove(key);
                return;
            }
        }

        let count = self.arena[key].count;
        let mut value = count;
        let mut bit = 0u32;
        for (level_index, level) in self.levels.iter().enumerate() {
            value >>= level.bit();
            if value == 0 {
                let offset = count >> bit;
                self.arena[key].count = count - (offset << bit);
                self.levels[level_index].push(&mut self.arena, offset as usize, key, level_index);
                return;
            }
            bit += level.bit();
        }

        let err = Error::horizon(count);
        error!(count, "{err}");
        // §5 fail-fast: horizon overflow is a defect in the caller's wheel
        // sizing, not a recoverable condition, so the owning worker task
        // halts rather than silently dropping the timer.
        panic!("{err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DirectDispatcher;
    use crate::scheduler::SimpleScheduler;

    fn worker(level_sizes: &[usize]) -> Worker {
        let (quit_tx, _quit_rx) = watch::channel(false);
        let (_stop_tx, stop_rx) = watch::channel(false);
        Worker {
            interval: Duration::from_secs(1),
            levels: level_sizes.iter().map(|&s| WheelLevel::new(s).unwrap()).collect(),
            levels_mask: level_sizes.len() - 1,
            arena: Arena::default(),
            ids: std::collections::HashMap::new(),
            scheduler: Arc::new(SimpleScheduler::new(Box::new(DirectDispatcher::new()))),
            tick_count: Arc::new(AtomicI64::new(0)),
            metrics: WheelMetrics::new(),
            quit_tx,
            stop_rx,
        }
    }

    #[test]
    #[should_panic(expected = "horizon overflow")]
    fn countdown_beyond_horizon_panics() {
        // levels={1,2} represent 2 bits total (horizon = 4 ticks); a
        // countdown of 100 cannot be placed in any level.
        let mut w = worker(&[1, 2]);
        let key = w.arena.insert(TimerRecord::new(TimerHandle(1), Timer::one_shot(100, || {})));
        w.insert_timer(key);
    }

    #[test]
    fn countdown_within_horizon_is_placed_without_panicking() {
        let mut w = worker(&[1, 2, 4, 8]);
        // horizon = 1*2*4*8 = 64 ticks representable.
        let key = w.arena.insert(TimerRecord::new(TimerHandle(1), Timer::one_shot(63, || {})));
        w.insert_timer(key);
        assert!(w.arena.get(key).unwrap().slot_ref.is_some());
    }

    #[test]
    fn cascade_reinserts_a_slot_head_to_tail() {
        // §5 ordering guarantee 3 / §4.4 drain-and-reinsert: timers that
        // were sitting together in a cascaded slot must be handed to
        // `insert_timer` — and thus fire, since this worker uses a
        // `DirectDispatcher` that runs callbacks inline — in the order
        // they were originally enrolled (head-to-tail), not tail-to-head.
        let mut w = worker(&[4]);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut slot = crate::slot::Slot::new();
        for i in 0..3u64 {
            let order = order.clone();
            let key = w.arena.insert(TimerRecord::new(
                TimerHandle(i),
                Timer::one_shot(0, move || order.lock().unwrap().push(i)),
            ));
            slot.push_back(&mut w.arena, key, crate::timer::SlotRef { level: 0, index: 0 });
        }

        w.insert_slot(slot);

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
