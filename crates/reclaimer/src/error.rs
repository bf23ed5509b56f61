use crate::domain::CandidateId;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::Error),

    #[error("Candidate {0} is already registered")]
    AlreadyRegistered(CandidateId),

    #[error("Candidate {0} is not registered")]
    NotRegistered(CandidateId),

    #[error("Failed to read procfs info: {0}")]
    Procfs(#[from] procfs::ProcError),

    #[error("Malformed zoneinfo at line {line}: {reason}")]
    ZoneInfo { line: usize, reason: String },

    #[error("Meminfo field does not exist: {0}")]
    MeminfoFieldMissing(&'static str),

    #[error("Failed to deliver signal: {0}")]
    Signal(#[from] nix::Error),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reclaim task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
