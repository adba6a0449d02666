// src/watch/debounce.rs

//! Trailing-edge debouncer owned by the dispatch loop.
//!
//! It holds at most one pending item and one deadline. Every `push` replaces
//! the pending item and restarts the quiet period, so a burst of events
//! collapses into the last one. It has no timers, tasks or locks of its own:
//! the dispatch loop sleeps until [`Debouncer::deadline`] and then calls
//! [`Debouncer::take_due`]. Because pushes and fires happen on the same loop,
//! a fire can never be lost to a concurrent restart.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record `item` as the most recent pending one and restart the quiet
    /// period from `now`.
    pub fn push(&mut self, item: T, now: Instant) {
        self.pending = Some(item);
        self.deadline = Some(now + self.delay);
    }

    /// When the pending item becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending item if its quiet period has elapsed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Drop whatever is pending without firing it.
    pub fn clear(&mut self) {
        self.pending = None;
        self.deadline = None;
    }
}
