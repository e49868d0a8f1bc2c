use crate::model::{BlockId, ProgramId, UserId};
use std::io;
use std::path::PathBuf;

/// Errors returned by the registry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed journal data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to watch the journal: {0}")]
    Watch(#[from] notify::Error),

    #[error("another writer holds the lock on {}", .0.display())]
    Locked(PathBuf),

    #[error("{kind} #{id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },

    #[error("{kind} #{id} is still in use: {reason}")]
    InUse {
        kind: &'static str,
        id: u64,
        reason: String,
    },

    #[error("program registration is closed")]
    RegistrationClosed,

    #[error("{user} is not allowed to attend {program}")]
    NotAllowed { user: UserId, program: ProgramId },

    #[error("{user} is already registered to {program}")]
    AlreadyRegistered { user: UserId, program: ProgramId },

    #[error("{user} already attends another program of {block}")]
    BlockAlreadyAttended { user: UserId, block: BlockId },

    #[error("{program} overlaps with {other} attended by {user}")]
    Overlap {
        user: UserId,
        program: ProgramId,
        other: ProgramId,
    },

    #[error("{program} is full")]
    ProgramFull { program: ProgramId },

    #[error("{user} is not registered to {program}")]
    NotRegistered { user: UserId, program: ProgramId },

    #[error("programs of auto-registered {block} cannot be left")]
    AutoRegistered { block: BlockId },
}

impl Error {
    pub(crate) fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
