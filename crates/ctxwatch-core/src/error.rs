//! Error types for snapshot persistence and transcript following.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from usage accounting and snapshot persistence
#[derive(Debug, Error)]
pub enum UsageError {
    /// Session id contains characters that could escape the state directory
    #[error("invalid session id '{id}': {reason}")]
    InvalidSessionId { id: String, reason: &'static str },

    /// The session's snapshot directory could not be created
    #[error("failed to create snapshot directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or renaming the snapshot file failed
    #[error("failed to write snapshot {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving the previous snapshot to its backup name failed
    #[error("failed to back up snapshot {from:?} to {to:?}")]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be serialized
    #[error("failed to serialize snapshot")]
    Serialize(#[from] serde_json::Error),
}

/// Terminal errors from the transcript follower.
///
/// A missing transcript is not an error (the follower waits for it); these
/// are raised only when the path exists but can no longer be accessed.
#[derive(Debug, Error)]
pub enum TailError {
    /// The transcript path cannot be stat'ed or opened
    #[error("transcript {path:?} is inaccessible")]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading from an open transcript failed
    #[error("failed to read transcript {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TailError {
    /// Path of the transcript that failed
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Inaccessible { path, .. } | Self::Read { path, .. } => path,
        }
    }
}
