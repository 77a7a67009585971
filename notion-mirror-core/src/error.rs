//! Error types for notion-mirror-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`crate::contract::ContentSource`] implementation.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested container or document does not exist (or is not shared).
    #[error("not found: {0}")]
    NotFound(String),

    /// The upstream asked us to slow down.
    #[error("rate limited by source API")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeouts, connection resets, 5xx responses.
    #[error("transient source error: {0}")]
    Transient(String),

    /// Any other non-success response.
    #[error("source API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be understood.
    #[error("failed to decode source response: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. } | SourceError::Transient(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised by a [`crate::contract::DestinationStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The revision marker or branch head moved underneath us.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited by destination API")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient destination error: {0}")]
    Transient(String),

    #[error("destination API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode destination response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited { .. } | StoreError::Transient(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            StoreError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors from loading or saving the location ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a single document could not be turned into a candidate.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures that abort a whole run. Everything else is recovered locally and
/// recorded in the [`crate::synchronise::SyncReport`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to persist location ledger: {0}")]
    Ledger(#[from] LedgerError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.into(),
        source,
    }
}
