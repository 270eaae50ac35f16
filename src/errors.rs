//! Typed error definitions for dirbridge.
//! The lock taxonomy mirrors the failure modes the server and the local
//! file lock can report, so callers can match on them instead of parsing
//! message strings.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure modes of lock operations, local and network-backed alike.
#[derive(Debug, Error)]
pub enum LockError {
    /// Someone else holds the lock and could not be reached.
    #[error("already locked{}", owner_suffix(owner))]
    AlreadyLocked { owner: Option<String> },

    /// Someone else holds the lock, was reached, and replied.
    #[error("lock owner replied: {response}")]
    SentMessage { response: String },

    /// The operation required a lock the caller does not hold.
    #[error("operation requires a lock that is not held")]
    NotLocked,

    /// The lock state could not be determined (e.g. a network blip).
    /// Retryable; not necessarily fatal.
    #[error("unable to determine lock state: {0}")]
    Uncertain(String),

    /// An offline-enabled lock was broken by someone else while we were
    /// disconnected. Carries the last known sync timestamp (ms since epoch)
    /// so the caller can assess which local edits are at risk.
    #[error("offline lock was broken by another party")]
    OfflineLockLost { last_sync: Option<i64> },

    /// Filesystem write protection prevents locking.
    #[error("file is read-only: {0}")]
    ReadOnly(PathBuf),

    /// The server rejected the action with a tag we do not recognize.
    #[error("server rejected lock action: {0}")]
    Rejected(String),

    /// The lock could not be created or asserted for any other reason.
    #[error("lock operation failed: {0}")]
    Failed(String),
}

fn owner_suffix(owner: &Option<String>) -> String {
    match owner {
        Some(name) => format!(" by {name}"),
        None => String::new(),
    }
}

impl LockError {
    /// Whether this failure definitely ends the current lock session.
    /// `Uncertain` is the only retryable variant.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LockError::Uncertain(_))
    }
}

impl From<io::Error> for LockError {
    fn from(e: io::Error) -> Self {
        LockError::Failed(e.to_string())
    }
}

/// Errors surfaced by sync and directory operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Lock(#[from] LockError),
}

pub type SyncResult<T> = Result<T, SyncError>;
