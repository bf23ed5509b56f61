#![forbid(unsafe_code)]

mod candidate;
mod context;
mod ids;
mod zone;

pub use candidate::{CandidateFlags, CandidateRecord, CandidateState};
pub use context::{ExecutionContext, RequestContext};
pub use ids::{CandidateId, Priority};
pub use zone::{GlobalCounters, SWAP_CLUSTER_MAX, ZoneCounters, ZoneKind};
