//! Error types for the manhunt event core.
//!
//! Every public operation returns [`HuntError`]. None of these are allowed
//! to escape into the host process: callers at the host boundary log and
//! swallow them.

use std::path::PathBuf;

use crate::types::ParticipantId;

/// Failures reading or writing persisted event state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported state file version {version} at {path}")]
    UnsupportedVersion { path: PathBuf, version: u8 },

    /// Injected by in-memory stores to exercise failure paths.
    #[error("store rejected the write")]
    Rejected,
}

#[derive(Debug, thiserror::Error)]
pub enum HuntError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] StoreError),

    #[error("not enough eligible participants ({found} of {required})")]
    InsufficientParticipants { found: usize, required: usize },

    #[error("participant {0} is already registered in the event")]
    DuplicateParticipant(ParticipantId),

    #[error("{0} service is not available")]
    CollaboratorUnavailable(&'static str),

    #[error("deferred action {timer} failed: {reason}")]
    DeferredActionFailure { timer: &'static str, reason: String },

    #[error("no manhunt event is in progress")]
    NoActiveEvent,

    #[error("a manhunt event is already in progress")]
    AlreadyInProgress,

    #[error("participant {0} is not connected")]
    UnknownParticipant(ParticipantId),

    #[error("elevation refused for participant {0}")]
    ElevationRefused(ParticipantId),

    #[error("host rejected {action}: {reason}")]
    Host {
        action: &'static str,
        reason: String,
    },
}

impl HuntError {
    pub fn host(action: &'static str, reason: impl Into<String>) -> Self {
        Self::Host {
            action,
            reason: reason.into(),
        }
    }
}
