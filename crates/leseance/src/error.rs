//! Domain error types

use thiserror::Error;

use crate::model::SessionStatus;

/// Violations of the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The requested status transition is not in the transition table.
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition {
        /// Status the session currently holds.
        from: SessionStatus,
        /// Status the caller attempted to move to.
        to: SessionStatus,
    },

    /// The session already reached a terminal status and is immutable.
    #[error("session {0} is terminal and immutable")]
    TerminalImmutable(String),

    /// `result` is set exactly once, at the step producing the terminal output.
    #[error("result already set for session {0}")]
    ResultAlreadySet(String),
}

/// Request payload rejected before a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The payload is not a JSON object.
    #[error("payload must be a JSON object")]
    NotAnObject,

    /// A field required for this kind is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A required field is present but empty.
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// A field is present but has the wrong shape.
    #[error("field `{field}` is invalid: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Human-readable rejection reason.
        reason: String,
    },
}
