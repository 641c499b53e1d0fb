//! Timer records and completion policies.
//!
//! A [`Timer`] is the unenrolled, user-facing descriptor: a countdown, a
//! callback, and a [`CompletionPolicy`] deciding what happens after it
//! fires. Once enrolled (see [`crate::timing::TimingWheel`]) it becomes a
//! [`TimerRecord`] living in the wheel's internal arena, addressed from
//! the outside only through the opaque, `Copy` [`TimerHandle`].

use std::sync::{Arc, Mutex};

use slotmap::new_key_type;

new_key_type! {
    /// Internal arena key for a pending timer. Never exposed to callers —
    /// see [`TimerHandle`] for the identity callers actually hold.
    pub(crate) struct TimerKey;
}

/// A zero-argument callback, boxed once at enrolment and shared with the
/// scheduler/dispatcher without copying.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

pub(crate) fn noop_callback() -> Callback {
    Arc::new(|| {})
}

/// An opaque handle to an enrolled timer.
///
/// Carries no state of its own: the worker's copy of the timer is
/// authoritative. The only legal operations on a handle are comparing it
/// for identity and submitting it to
/// [`crate::timing::TimingWheel::cancel`]. Cheap to clone and to capture
/// in another timer's callback (see the cancel-dominance scenario in the
/// crate-level docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub(crate) u64);

/// The next-countdown policy consulted after a timer fires.
///
/// Matches the four canonical policies from the original design plus a
/// `Custom` escape hatch for callers who build a [`Timer`] directly via
/// [`Timer::custom`]. `Table` and `BoundedRepeat` own their own walk
/// state rather than overloading the timer's rearm `value`, which keeps
/// a `Timer` built with one policy safe to inspect (`value`) without
/// worrying whether some other policy is secretly mutating it underfoot.
pub enum CompletionPolicy {
    /// Always returns 0: one-shot.
    ToZero,
    /// Always returns the timer's fixed rearm value: regular periodic.
    ToValue,
    /// Walks a fixed table of countdowns, returning 0 once exhausted.
    Table {
        /// Countdown sequence consulted after each firing.
        table: Arc<[i64]>,
        /// Index into `table` of the most recently returned countdown.
        index: usize,
    },
    /// Delegates to an inner policy for a bounded number of additional
    /// firings, then returns 0.
    BoundedRepeat {
        /// Remaining firings, decremented on every call to `complete`.
        remaining: i64,
        /// Policy consulted while `remaining` stays positive.
        inner: Box<CompletionPolicy>,
    },
    /// A user-supplied pure function of the timer's rearm `value`.
    Custom(Arc<dyn Fn(i64) -> i64 + Send + Sync>),
}

impl std::fmt::Debug for CompletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToZero => write!(f, "ToZero"),
            Self::ToValue => write!(f, "ToValue"),
            Self::Table { table, index } => {
                f.debug_struct("Table").field("table", table).field("index", index).finish()
            }
            Self::BoundedRepeat { remaining, inner } => f
                .debug_struct("BoundedRepeat")
                .field("remaining", remaining)
                .field("inner", inner)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl CompletionPolicy {
    /// Compute the next countdown after a firing. `value` is the timer's
    /// rearm baseline (`TimerRecord::value`); only `ToValue` and `Custom`
    /// read it, `Table`/`BoundedRepeat` walk their own state instead.
    pub(crate) fn complete(&mut self, value: i64) -> i64 {
        match self {
            Self::ToZero => 0,
            Self::ToValue => value,
            Self::Table { table, index } => {
                *index += 1;
                if *index < table.len() {
                    table[*index]
                } else {
                    0
                }
            }
            Self::BoundedRepeat { remaining, inner } => {
                *remaining -= 1;
                if *remaining > 0 {
                    inner.complete(value)
                } else {
                    0
                }
            }
            Self::Custom(f) => f(value),
        }
    }
}

/// An unenrolled timer descriptor, built directly for cases the
/// convenience constructors on `TimingWheel` don't cover (a table
/// schedule, a bounded number of repeats, or a fully custom policy), then
/// handed to [`crate::timing::TimingWheel::add`].
pub struct Timer {
    pub(crate) count: i64,
    pub(crate) value: i64,
    pub(crate) policy: CompletionPolicy,
    pub(crate) callback: Callback,
}

impl Timer {
    /// A timer with a fixed rearm `value` and an explicit initial
    /// countdown (`count` may differ from `value` for the first firing,
    /// e.g. an `AtInterval` whose first deadline isn't a multiple of the
    /// interval).
    pub fn periodic<F>(count: i64, value: i64, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            count,
            value,
            policy: CompletionPolicy::ToValue,
            callback: Arc::new(callback),
        }
    }

    /// A one-shot timer: fires once after `count` ticks, never rearms.
    pub fn one_shot<F>(count: i64, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            count,
            value: 0,
            policy: CompletionPolicy::ToZero,
            callback: Arc::new(callback),
        }
    }

    /// A table-driven timer: `counts[0]` is the initial countdown;
    /// subsequent firings rearm with `counts[1]`, `counts[2]`, ... until
    /// the table is exhausted, at which point the timer stops. A
    /// single-element table behaves like [`Timer::one_shot`].
    ///
    /// # Panics
    /// Panics if `counts` is empty.
    pub fn table<F>(counts: &[i64], callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        assert!(!counts.is_empty(), "Timer::table requires at least one countdown");
        let policy = if counts.len() == 1 {
            CompletionPolicy::ToZero
        } else {
            CompletionPolicy::Table {
                table: Arc::from(counts),
                index: 0,
            }
        };
        Self {
            count: counts[0],
            value: 0,
            policy,
            callback: Arc::new(callback),
        }
    }

    /// A timer that rearms with `value` ticks up to `times` total firings,
    /// then stops.
    pub fn bounded_repeat<F>(count: i64, value: i64, times: i64, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            count,
            value,
            policy: CompletionPolicy::BoundedRepeat {
                remaining: times,
                inner: Box::new(CompletionPolicy::ToValue),
            },
            callback: Arc::new(callback),
        }
    }

    /// A timer driven by a caller-supplied completion policy.
    pub fn custom<F>(count: i64, value: i64, policy: CompletionPolicy, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            count,
            value,
            policy,
            callback: Arc::new(callback),
        }
    }
}

/// A timer's back-reference: the precise `(level, physical index)` a
/// pending timer currently occupies, letting cancellation unlink it in
/// O(1) without scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRef {
    pub(crate) level: usize,
    pub(crate) index: usize,
}

/// The worker-owned record for an enrolled timer. Lives in the wheel's
/// arena for the timer's entire life, whether pending in a slot or
/// momentarily detached between a firing and its rearm.
///
/// The callback lives behind a shared `Mutex` cell rather than a bare
/// `Callback`. Firing hands the *cell* (not a snapshot of its contents)
/// to the scheduler, so a cancellation processed after the callback is
/// already queued for dispatch still replaces what actually runs —
/// matching the inert-after-cancel guarantee even when dispatch is
/// asynchronous (a bounded-queue or hashing dispatcher may run the
/// callback well after the worker has moved on).
pub(crate) struct TimerRecord {
    pub(crate) handle: TimerHandle,
    pub(crate) count: i64,
    pub(crate) value: i64,
    pub(crate) policy: CompletionPolicy,
    callback: Arc<Mutex<Callback>>,
    pub(crate) prev: Option<TimerKey>,
    pub(crate) next: Option<TimerKey>,
    pub(crate) slot_ref: Option<SlotRef>,
}

impl TimerRecord {
    pub(crate) fn new(handle: TimerHandle, timer: Timer) -> Self {
        Self {
            handle,
            count: timer.count,
            value: timer.value,
            policy: timer.policy,
            callback: Arc::new(Mutex::new(timer.callback)),
            prev: None,
            next: None,
            slot_ref: None,
        }
    }

    /// A clone of the shared callback cell, to be wrapped into the
    /// closure actually handed to the scheduler at firing time.
    pub(crate) fn callback_cell(&self) -> Arc<Mutex<Callback>> {
        self.callback.clone()
    }

    /// Invoke whatever callback currently lives in the cell. Used by
    /// tests and by callers that fire synchronously without a scheduler.
    #[cfg(test)]
    pub(crate) fn invoke(&self) {
        let callback = self.callback.lock().expect("callback cell poisoned").clone();
        callback();
    }

    /// Replace the callback with a no-op and the policy with `ToZero`,
    /// making the timer inert even if it is mid-flight to the scheduler
    /// when cancellation is processed (§4.3 inert-after-cancel).
    pub(crate) fn cancel(&mut self) {
        *self.callback.lock().expect("callback cell poisoned") = noop_callback();
        self.policy = CompletionPolicy::ToZero;
    }
}
