#![forbid(unsafe_code)]

pub mod clock;
pub mod domain;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod host;
pub mod index;
pub mod selector;
pub mod threshold;
pub mod throttle;
pub mod tunables;
pub mod wait;

pub use engine::{ControlEvent, ReclaimEngine, Services, SyncReport, TickReport, shrink_budget};
pub use error::Error;
pub use estimator::{Estimate, MemoryEstimator};
pub use host::{
    MemoryCounters, ProcessEntry, ProcessHost, ProcessSource, ProcfsHost, oom_adj_from_score_adj,
};
pub use index::{IndexNode, PriorityIndex};
pub use selector::{LowMemoryKiller, ReclaimAction, ReclaimOutcome, StatsSnapshot, Victim};
pub use threshold::ThresholdTable;
pub use throttle::ThrottleState;
pub use tunables::{Param, Tunables};
pub use wait::{Interrupt, Interrupted};

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    CandidateFlags, CandidateId, CandidateRecord, CandidateState, ExecutionContext,
    GlobalCounters, Priority, RequestContext, ZoneCounters, ZoneKind,
};
