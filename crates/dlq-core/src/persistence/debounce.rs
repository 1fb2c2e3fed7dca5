//! Coalesces bursts of queue mutations into a single save.

use std::time::{Duration, Instant};

/// Tracks "is there unsaved state, and has it been quiet long enough to
/// write it". The Manager's event loop calls [`Debouncer::mark_dirty`] after
/// every mutation and checks [`Debouncer::due`] on each loop tick; a
/// `max_wait` safety valve forces a save even under continuous churn so
/// progress isn't lost indefinitely.
#[derive(Debug)]
pub struct Debouncer {
    quiet_period: Duration,
    max_wait: Duration,
    first_dirty_at: Option<Instant>,
    last_dirty_at: Option<Instant>,
    last_saved_hash: Option<u64>,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            max_wait: quiet_period * 5,
            first_dirty_at: None,
            last_dirty_at: None,
            last_saved_hash: None,
        }
    }

    pub fn mark_dirty(&mut self, now: Instant) {
        if self.first_dirty_at.is_none() {
            self.first_dirty_at = Some(now);
        }
        self.last_dirty_at = Some(now);
    }

    /// True once either the quiet period has elapsed since the last
    /// mutation, or `max_wait` has elapsed since the first unsaved mutation.
    pub fn due(&self, now: Instant) -> bool {
        let Some(last) = self.last_dirty_at else {
            return false;
        };
        if now.duration_since(last) >= self.quiet_period {
            return true;
        }
        match self.first_dirty_at {
            Some(first) => now.duration_since(first) >= self.max_wait,
            None => false,
        }
    }

    pub fn mark_saved(&mut self) {
        self.first_dirty_at = None;
        self.last_dirty_at = None;
    }

    /// True when `hash` (the content hash of the state about to be saved)
    /// matches the last write actually committed to disk, letting the
    /// caller skip a redundant backup+rewrite.
    pub fn unchanged_since_last_save(&self, hash: u64) -> bool {
        self.last_saved_hash == Some(hash)
    }

    pub fn mark_saved_with_hash(&mut self, hash: u64) {
        self.first_dirty_at = None;
        self.last_dirty_at = None;
        self.last_saved_hash = Some(hash);
    }

    pub fn is_dirty(&self) -> bool {
        self.last_dirty_at.is_some()
    }
}
