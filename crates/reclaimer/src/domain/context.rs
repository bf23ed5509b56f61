#![forbid(unsafe_code)]

use super::{CandidateId, ZoneKind};
use crate::wait::Interrupt;

/// Describes the allocation that triggered a reclaim call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Highest zone the allocation may be served from.
    pub highest_zone: ZoneKind,
    /// Raised to cut any wait in the reclaim path short.
    pub interrupt: Interrupt,
}

impl RequestContext {
    pub fn new(highest_zone: ZoneKind) -> Self {
        Self {
            highest_zone,
            interrupt: Interrupt::default(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

/// Who is running the reclaim path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionContext {
    /// The candidate the caller belongs to, if any.
    pub candidate: Option<CandidateId>,
    /// The caller is itself exiting with a death mark.
    pub is_self_dying: bool,
    /// The caller is the background balancer.
    pub is_background_balancer: bool,
}

impl ExecutionContext {
    pub fn is(&self, id: CandidateId) -> bool {
        self.candidate == Some(id)
    }
}
