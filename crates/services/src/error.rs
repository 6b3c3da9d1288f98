//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::SessionError;
use storage::StorageError;

/// Errors emitted by question providers.
///
/// Provider failures surface to the caller of the start flow and never touch
/// session state; the distinction between `Unavailable`/`HttpStatus` and the
/// payload-shaped variants drives the retry messaging.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("trivia service is unavailable")]
    Unavailable(#[from] reqwest::Error),

    #[error("trivia service returned status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("trivia service reported response code {0}")]
    ServiceCode(u8),

    #[error("trivia payload is malformed: {0}")]
    Malformed(String),
}

/// Errors emitted by the write-through session store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionStoreError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted when building a score report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReportError {
    #[error("a report requires a completed session")]
    NotCompleted,
}
