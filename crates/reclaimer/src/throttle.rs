#![forbid(unsafe_code)]

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Deadline of the most recent kill.
///
/// While the deadline has not passed, the previous victim is assumed to be
/// still releasing memory and a new kill must wait for it.
#[derive(Debug, Default)]
pub struct ThrottleState {
    deadline: Mutex<Option<Instant>>,
}

impl ThrottleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a kill issued at `now`.
    pub fn arm(&self, now: Instant, grace_window: Duration) {
        *self.deadline.lock() = Some(now + grace_window);
    }

    /// Whether `now` still falls inside the last kill's grace window. The
    /// deadline itself is inside.
    pub fn is_active(&self, now: Instant) -> bool {
        self.deadline.lock().is_some_and(|deadline| now <= deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }
}
