//! Submission error types

use thiserror::Error;

use leseance::{StoreError, ValidationError};

/// Why a request was not admitted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Malformed or incomplete request; no session was created.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The session store refused the admission write; the caller should
    /// retry, nothing was admitted.
    #[error("session store unavailable: {0}")]
    Store(#[from] StoreError),
}
