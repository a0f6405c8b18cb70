//! Host timer facility used for debouncing.
//!
//! A single-threaded queue on a virtual clock: the embedder advances time and
//! due callbacks run synchronously on the calling thread, in due order, ties
//! broken by scheduling order.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::trace;

/// Unique identifier for a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Create a new TimerId.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer callback.
pub type TimerCallback = Box<dyn FnOnce() + 'static>;

struct TimerEntry {
    id: TimerId,
    callback: TimerCallback,
    due: Duration,
}

impl std::fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEntry")
            .field("id", &self.id)
            .field("due", &self.due)
            .finish_non_exhaustive()
    }
}

/// One-shot timers on a virtual clock (setTimeout/clearTimeout equivalent).
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Cell<Duration>,
    timers: RefCell<Vec<TimerEntry>>,
}

impl TimerQueue {
    /// Create an empty queue with the clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of scheduled, not yet fired timers.
    pub fn pending_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Whether a timer is still scheduled.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.borrow().iter().any(|t| t.id == id)
    }

    /// Due time of the earliest timer.
    pub fn next_due(&self) -> Option<Duration> {
        self.timers.borrow().iter().map(|t| t.due).min()
    }

    /// Schedule a one-shot timer.
    pub fn set_timeout<F>(&self, callback: F, delay: Duration) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let id = TimerId::new();
        let due = self.now.get() + delay;
        self.timers.borrow_mut().push(TimerEntry {
            id,
            callback: Box::new(callback),
            due,
        });

        trace!(?id, ?delay, "Timer scheduled");
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn clear_timer(&self, id: TimerId) -> bool {
        let mut timers = self.timers.borrow_mut();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        let cancelled = timers.len() != before;

        if cancelled {
            trace!(?id, "Timer cancelled");
        }
        cancelled
    }

    /// Cancel every timer.
    pub fn clear_all(&self) {
        self.timers.borrow_mut().clear();
    }

    /// Move the clock forward, running every timer that falls due.
    /// Timers scheduled by callbacks run too if they fall inside the window.
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = self.now.get() + by;
        let mut fired = 0;

        while let Some(entry) = self.pop_due(deadline) {
            if entry.due > self.now.get() {
                self.now.set(entry.due);
            }
            trace!(id = ?entry.id, due = ?entry.due, "Timer fired");
            (entry.callback)();
            fired += 1;
        }

        self.now.set(deadline);
        fired
    }

    /// Run timers until none are left, jumping the clock as needed.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while let Some(due) = self.next_due() {
            fired += self.advance(due.saturating_sub(self.now.get()));
        }
        fired
    }

    fn pop_due(&self, deadline: Duration) -> Option<TimerEntry> {
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= deadline)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;
        Some(timers.remove(index))
    }
}
