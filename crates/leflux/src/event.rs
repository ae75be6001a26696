//! Event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leseance::SessionId;

/// What a progress event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A stage began executing.
    StageStarted,
    /// Intra-stage progress, one per retry attempt.
    StageProgress,
    /// A stage produced its output.
    StageCompleted,
    /// A stage exhausted its retry budget.
    StageFailed,
    /// The session reached a terminal status; always the last event.
    SessionTerminal,
}

impl EventKind {
    /// Whether this event closes the session's stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::SessionTerminal)
    }
}

/// One entry in a session's ordered event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session this event belongs to.
    pub session_id: SessionId,

    /// Monotonically increasing per session, starting at 0.
    pub sequence: u64,

    /// Event kind.
    pub kind: EventKind,

    /// Kind-specific payload.
    pub payload: serde_json::Value,

    /// Publication timestamp.
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    /// Serialize for wire delivery.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventKind::StageStarted).expect("serialize"),
            "\"stage_started\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::SessionTerminal).expect("serialize"),
            "\"session_terminal\""
        );
    }

    #[test]
    fn only_session_terminal_is_terminal() {
        assert!(EventKind::SessionTerminal.is_terminal());
        assert!(!EventKind::StageStarted.is_terminal());
        assert!(!EventKind::StageFailed.is_terminal());
    }

    #[test]
    fn event_json_carries_sequence_and_kind() {
        let event = SessionEvent {
            session_id: SessionId::from_string("s-1"),
            sequence: 3,
            kind: EventKind::StageCompleted,
            payload: serde_json::json!({"stage": "assemble"}),
            timestamp: Utc::now(),
        };
        let raw = event.to_json();
        assert!(raw.contains("\"sequence\":3"));
        assert!(raw.contains("stage_completed"));
    }
}
