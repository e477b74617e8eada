//! Error types for the sorbus crate.

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SorbusError>;

/// Errors produced by index lifecycle management.
#[derive(Debug, Error)]
pub enum SorbusError {
    /// The write lock is held by a live owner that survived forced-release
    /// recovery. Fatal; always surfaced.
    #[error("write lock held: {0}")]
    LockHeld(String),

    /// The persisted index belongs to a different repository, or carries no
    /// descriptor at all.
    #[error("index identity mismatch: {0}")]
    IdentityMismatch(String),

    /// The context was configured in a way that cannot produce a valid index.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Io(#[from] io::Error),

    /// Index-level failure: corrupt manifest, unreadable segment, missing
    /// writer, and similar engine conditions.
    #[error("index error: {0}")]
    Index(String),
}

impl SorbusError {
    /// Create a lock-held error.
    pub fn lock_held(msg: impl Into<String>) -> Self {
        SorbusError::LockHeld(msg.into())
    }

    /// Create an identity-mismatch error.
    pub fn identity_mismatch(msg: impl Into<String>) -> Self {
        SorbusError::IdentityMismatch(msg.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        SorbusError::Configuration(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        SorbusError::Index(msg.into())
    }

    /// True for failures that an open with reclaim requested may recover from
    /// by wiping and recreating the index. Lock contention and identity
    /// conflicts are never reclaimable.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, SorbusError::Io(_) | SorbusError::Index(_))
    }

    /// True if this is an identity-mismatch error.
    pub fn is_identity_mismatch(&self) -> bool {
        matches!(self, SorbusError::IdentityMismatch(_))
    }

    /// True if this is a lock-held error.
    pub fn is_lock_held(&self) -> bool {
        matches!(self, SorbusError::LockHeld(_))
    }
}
