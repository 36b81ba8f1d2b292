//! History error types.

use thiserror::Error;

/// Errors raised by recorders and the manager.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A transaction was started while one was already open.
    #[error("already in a transaction")]
    AlreadyInTransaction,

    /// The document store failed to apply, diff or invert a change.
    #[error("document store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;
