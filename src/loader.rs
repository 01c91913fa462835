//! Deferred startup initializers.
//!
//! Components schedule setup work (such as registering their apply types)
//! while they are being wired up; the owner drains the queue once, when all
//! of them are known, in descending priority.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use tracing::debug;

/// Priority of type registrations. Runs before anything that adds rules.
pub const PRIORITY_REGISTER_TYPES: i32 = 100;
/// Priority of default work.
pub const PRIORITY_DEFAULT: i32 = 0;

type Callback<C> = Box<dyn FnOnce(&mut C) + Send>;

struct Initializer<C> {
    priority: i32,
    seq: u64,
    callback: Callback<C>,
}

impl<C> PartialEq for Initializer<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<C> Eq for Initializer<C> {}

impl<C> PartialOrd for Initializer<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Initializer<C> {
    // Max-heap: higher priority first, then earlier insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A priority queue of one-shot callbacks run against a context `C`.
pub struct DeferredInitializers<C> {
    queue: BinaryHeap<Initializer<C>>,
    next_seq: u64,
}

impl<C> Default for DeferredInitializers<C> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<C> fmt::Debug for DeferredInitializers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredInitializers")
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl<C> DeferredInitializers<C> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `callback`. Equal priorities run in insertion order.
    pub fn add(&mut self, priority: i32, callback: impl FnOnce(&mut C) + Send + 'static) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Initializer {
            priority,
            seq,
            callback: Box::new(callback),
        });
    }

    /// Runs and removes every pending callback, highest priority first.
    ///
    /// Returns the number of callbacks run. The queue can be filled and
    /// drained again afterwards.
    pub fn run_all(&mut self, context: &mut C) -> usize {
        let mut ran = 0;
        while let Some(initializer) = self.queue.pop() {
            debug!(priority = initializer.priority, "running deferred initializer");
            (initializer.callback)(context);
            ran += 1;
        }
        ran
    }

    /// Number of queued callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
