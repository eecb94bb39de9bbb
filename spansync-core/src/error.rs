//! Error types for Spansync operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Backend error: {reason}")]
    Backend { reason: String },
}

/// Master error type for all Spansync operations.
///
/// `InvalidArgument` and `NoSourceForPrefix` abort a whole query;
/// `SourceUnavailable` is recovered per sub-window and only surfaces
/// when nothing at all could be answered for a card.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("No source registered for card prefix {prefix}")]
    NoSourceForPrefix { prefix: String },

    #[error("Source for prefix {prefix} unavailable: {reason}")]
    SourceUnavailable { prefix: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CacheError {
    /// Shorthand for an `InvalidArgument` error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// True when this error is recovered locally (per card / sub-window)
    /// instead of aborting the whole batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

/// Result type alias for Spansync operations.
pub type CacheResult<T> = Result<T, CacheError>;
