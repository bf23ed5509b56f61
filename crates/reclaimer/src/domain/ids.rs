#![forbid(unsafe_code)]

use std::fmt;

/// Importance score of a candidate. Lower is more important; the
/// highest values are killed first.
pub type Priority = i32;

/// Identity of a candidate as understood by the host (a pid on Linux).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateId(pub u32);

impl CandidateId {
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CandidateId").field(&self.0).finish()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
