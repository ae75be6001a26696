//! API response types

use serde::{Deserialize, Serialize};

use lequota::QuotaSnapshot;
use leseance::SessionRecord;

/// Body of a successful `POST /sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Identifier of the admitted session
    pub session_id: String,

    /// Always `"queued"` at admission
    pub status: String,
}

/// Body of `GET /sessions`
#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    /// The caller's sessions, newest first
    pub sessions: Vec<SessionRecord>,

    /// Number of sessions returned
    pub total: usize,
}

/// Body of `GET /sessions/{id}/logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    /// Session the lines describe
    pub session_id: String,

    /// Step history rendered as display lines
    pub lines: Vec<String>,
}

/// Body of `POST /sessions/{id}/cancel`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    /// Session the cancellation targeted
    pub session_id: String,

    /// Whether a live session was marked for cancellation
    pub cancelled: bool,
}

/// Body of `GET /quota`
#[derive(Debug, Clone, Serialize)]
pub struct QuotaResponse {
    /// The caller
    pub user_id: String,

    /// Standing per gated capability
    pub capabilities: Vec<QuotaSnapshot>,
}

/// Body of a successful `POST /uploads`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// URI the stored object is served from
    pub uri: String,
}
