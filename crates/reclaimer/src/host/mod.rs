#![forbid(unsafe_code)]

//! Seams to the system the killer runs on.

mod procfs_host;
mod zoneinfo;

pub use procfs_host::{ProcfsHost, oom_adj_from_score_adj};
pub use zoneinfo::parse_zoneinfo;

use crate::domain::{
    CandidateId, CandidateState, ExecutionContext, GlobalCounters, Priority, ZoneCounters,
};
use crate::error::Error;
use std::sync::Arc;

/// Page counters of the system.
pub trait MemoryCounters: Send + Sync {
    fn global(&self) -> Result<GlobalCounters, Error>;

    /// Zones of the node being reclaimed for, most permissive first.
    fn zones(&self) -> Result<Vec<ZoneCounters>, Error>;
}

/// The process model: liveness, termination and the caller's identity.
pub trait ProcessHost: Send + Sync {
    /// Current state of a candidate, or `None` once it has gone.
    fn probe(&self, id: CandidateId) -> Option<CandidateState>;

    fn deliver_termination(&self, id: CandidateId) -> Result<(), Error>;

    /// Flag a candidate as selected for termination.
    fn mark_dying(&self, id: CandidateId);

    fn current_context(&self) -> ExecutionContext;
}

/// A live process as seen by the registry sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub id: CandidateId,
    pub priority: Priority,
    pub name: Arc<str>,
}

/// Enumerates live processes so registrations can follow them.
pub trait ProcessSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, Error>;
}
