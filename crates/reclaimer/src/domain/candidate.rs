#![forbid(unsafe_code)]

use super::{CandidateId, Priority};
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Liveness state of a candidate as reported by the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CandidateFlags: u8 {
        /// Kernel helper or other background thread; never a victim.
        const KERNEL_HELPER = 1 << 0;
        /// The process has started exiting.
        const EXITING = 1 << 1;
        /// The address space is already gone, nothing left to free.
        const MEMORY_RELEASED = 1 << 2;
        /// Selected for termination and not yet gone.
        const DEATH_MARKED = 1 << 3;
        /// A fatal signal is queued but not yet acted upon.
        const KILL_PENDING = 1 << 4;
    }
}

/// The index's own record of a registered candidate.
///
/// Only what is needed to order and report the candidate lives here; the
/// live state is resolved through the host on every scan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub priority: Priority,
    pub name: Arc<str>,
}

impl CandidateRecord {
    pub fn new(id: CandidateId, priority: Priority, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            priority,
            name: name.into(),
        }
    }
}

/// A point-in-time probe of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateState {
    pub flags: CandidateFlags,
    /// Resident pages.
    pub footprint: i64,
}

impl CandidateState {
    pub fn is_dying(&self) -> bool {
        self.flags.contains(CandidateFlags::KILL_PENDING)
            || self
                .flags
                .contains(CandidateFlags::EXITING | CandidateFlags::DEATH_MARKED)
    }
}
