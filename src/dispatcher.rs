//! The dispatcher tree: pluggable sinks for fired callbacks, decoupled
//! from the tick loop.
//!
//! Three composable variants, following the teacher crate's own pattern
//! of pairing a `crossbeam` bounded channel with a dedicated consumer
//! thread for backpressure (see its work-stealing scheduler).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::timer::Callback;

/// A sink for fired timer callbacks.
pub trait Dispatcher: Send + Sync {
    /// Start any background resources (consumer threads, child dispatchers).
    fn start(&self);
    /// Stop background resources. Idempotent is not guaranteed — callers
    /// (the [`crate::scheduler::Scheduler`]) call this at most once.
    fn stop(&self);
    /// Hand a fired callback to this dispatcher.
    fn dispatch(&self, callback: Callback);
}

/// Invokes the callback inline, on the caller's thread. No concurrency,
/// no queueing — the simplest possible dispatcher.
#[derive(Debug, Default)]
pub struct DirectDispatcher;

impl DirectDispatcher {
    /// Construct a new direct dispatcher.
    pub fn new() -> Self {
        Self
    }
}

impl Dispatcher for DirectDispatcher {
    fn start(&self) {}
    fn stop(&self) {}

    fn dispatch(&self, callback: Callback) {
        callback();
    }
}

/// Fans callbacks out across `children` by a monotone, pre-incremented
/// counter masked against `children.len() - 1`. `children.len()` must be
/// a power of two.
pub struct HashDispatcher {
    children: Vec<Box<dyn Dispatcher>>,
    mask: usize,
    counter: AtomicUsize,
}

impl HashDispatcher {
    /// Build a hash dispatcher over `children`.
    ///
    /// # Panics
    /// Panics if `children.len()` is not a power of two.
    pub fn new(children: Vec<Box<dyn Dispatcher>>) -> Self {
        let len = children.len();
        assert!(
            len != 0 && len.is_power_of_two(),
            "HashDispatcher requires a power-of-two number of children, got {len}"
        );
        Self {
            children,
            mask: len - 1,
            counter: AtomicUsize::new(0),
        }
    }
}

impl Dispatcher for HashDispatcher {
    fn start(&self) {
        for child in &self.children {
            child.start();
        }
    }

    fn stop(&self) {
        for child in &self.children {
            child.stop();
        }
    }

    fn dispatch(&self, callback: Callback) {
        let slot = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1) & self.mask;
        self.children[slot].dispatch(callback);
    }
}

struct QueueState {
    sender: Option<Sender<Callback>>,
    consumer: Option<JoinHandle<()>>,
}

/// A bounded queue in front of `inner`: `dispatch` pushes onto the queue
/// and blocks if it's full (the system's intentional backpressure);
/// `start` spawns one consumer thread forwarding every item to
/// `inner.dispatch`.
pub struct QueueDispatcher {
    capacity: usize,
    inner: Arc<dyn Dispatcher>,
    state: Mutex<QueueState>,
}

impl QueueDispatcher {
    /// Build a queue dispatcher with the given bounded `capacity` in
    /// front of `inner`.
    pub fn new(capacity: usize, inner: Box<dyn Dispatcher>) -> Self {
        Self {
            capacity,
            inner: Arc::from(inner),
            state: Mutex::new(QueueState {
                sender: None,
                consumer: None,
            }),
        }
    }
}

impl Dispatcher for QueueDispatcher {
    fn start(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(state.sender.is_none(), "QueueDispatcher started more than once");

        self.inner.start();
        let (tx, rx): (Sender<Callback>, Receiver<Callback>) = bounded(self.capacity);
        let consumer = std::thread::Builder::new()
            .name("wheeltime-dispatch".into())
            .spawn({
                let inner = self.inner.clone();
                move || {
                    for callback in rx.iter() {
                        inner.dispatch(callback);
                    }
                    trace!("queue dispatcher consumer exiting");
                }
            })
            .expect("failed to spawn dispatch consumer thread");

        state.sender = Some(tx);
        state.consumer = Some(consumer);
        debug!(capacity = self.capacity, "queue dispatcher started");
    }

    fn stop(&self) {
        let (consumer, ) = {
            let mut state = self.state.lock().unwrap();
            let sender = state.sender.take();
            drop(sender); // closes the channel, ending the consumer's `for` loop
            (state.consumer.take(),)
        };
        if let Some(handle) = consumer {
            if handle.join().is_err() {
                warn!("queue dispatcher consumer thread panicked");
            }
        }
        self.inner.stop();
    }

    fn dispatch(&self, callback: Callback) {
        let sender = self.state.lock().unwrap().sender.clone();
        match sender {
            Some(sender) => {
                if sender.send(callback).is_err() {
                    warn!("queue dispatcher dropped a callback after the queue closed");
                }
            }
            None => warn!("queue dispatcher dispatch() called before start()"),
        }
    }
}
