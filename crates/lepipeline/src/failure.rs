//! Typed stage failure categories

use std::time::Duration;

use thiserror::Error;

/// How a stage invocation failed.
///
/// Only `Timeout` and `Infrastructure` are retryable by default; a
/// `Domain` failure is the stage reporting that its input can never
/// succeed and is retried only when the stage's policy opts in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The invocation did not return before its deadline. The underlying
    /// work is abandoned, never interrupted; its result is never consumed.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The stage reported a domain failure (e.g. unreadable input media).
    /// Surfaced verbatim in the session's error summary.
    #[error("{0}")]
    Domain(String),

    /// A collaborator the stage depends on was unreachable.
    #[error("{0}")]
    Infrastructure(String),
}

impl StageError {
    /// Build a domain failure.
    pub fn domain(message: impl Into<String>) -> Self {
        StageError::Domain(message.into())
    }

    /// Build an infrastructure failure.
    pub fn infrastructure(message: impl Into<String>) -> Self {
        StageError::Infrastructure(message.into())
    }

    /// Whether this category is retried without an explicit opt-in.
    pub fn retryable_by_default(&self) -> bool {
        matches!(self, StageError::Timeout(_) | StageError::Infrastructure(_))
    }
}
