#![forbid(unsafe_code)]

//! Bounded, interruptible waits.
//!
//! Every blocking point of the reclaim path goes through [`Interrupt`]: the
//! serialisation lock is taken in short `try_lock_for` slices, and pauses
//! sleep on a condition variable with a deadline. Raising the interrupt
//! wakes every waiter, which then backs out with [`Interrupted`].

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Slice used when polling a contended lock for interruption.
const LOCK_POLL_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("wait interrupted")]
pub struct Interrupted;

#[derive(Debug, Default)]
struct Flag {
    raised: Mutex<bool>,
    cond: Condvar,
}

/// A cancellation source shared between the waiters and whoever cancels.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<Flag>,
}

impl Interrupt {
    pub fn raise(&self) {
        *self.flag.raised.lock() = true;
        self.flag.cond.notify_all();
    }

    pub fn clear(&self) {
        *self.flag.raised.lock() = false;
    }

    pub fn is_raised(&self) -> bool {
        *self.flag.raised.lock()
    }

    /// Sleep for `duration` unless interrupted first.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + duration;
        let mut raised = self.flag.raised.lock();
        while !*raised {
            if self.flag.cond.wait_until(&mut raised, deadline).timed_out() {
                return if *raised { Err(Interrupted) } else { Ok(()) };
            }
        }
        Err(Interrupted)
    }

    /// Acquire `mutex`, giving up as soon as the interrupt is raised.
    pub fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, Interrupted> {
        loop {
            if self.is_raised() {
                return Err(Interrupted);
            }
            if let Some(guard) = mutex.try_lock_for(LOCK_POLL_SLICE) {
                return Ok(guard);
            }
        }
    }
}
