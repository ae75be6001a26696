//! Session record, status transitions, and step history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Opaque unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier string.
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owning user identifier, as mapped from a verified identity token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an existing identifier string.
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request kind; determines the stage pipeline a session runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    /// Educational video from prompt + uploaded image and audio.
    VideoGeneration,
    /// Cloned-voice audio clip from text + reference audio.
    VoiceClone,
    /// Structured course syllabus.
    Syllabus,
    /// Weekly course schedule honoring constraints.
    CourseSchedule,
    /// Usage aggregation over the caller's session history.
    AnalyticsQuery,
}

impl SessionKind {
    /// Every supported kind, in a stable order.
    pub fn all() -> [SessionKind; 5] {
        [
            SessionKind::VideoGeneration,
            SessionKind::VoiceClone,
            SessionKind::Syllabus,
            SessionKind::CourseSchedule,
            SessionKind::AnalyticsQuery,
        ]
    }

    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::VideoGeneration => "video-generation",
            SessionKind::VoiceClone => "voice-clone",
            SessionKind::Syllabus => "syllabus",
            SessionKind::CourseSchedule => "course-schedule",
            SessionKind::AnalyticsQuery => "analytics-query",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle status.
///
/// The transition table is authoritative: `queued -> running` and
/// `running -> {completed, failed, quota_exceeded}` are the only legal
/// moves. Everything else is rejected with [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Admitted, execution not started.
    Queued,
    /// Pipeline execution in progress.
    Running,
    /// All stages succeeded; `result` is set.
    Completed,
    /// A stage failed or the session was cancelled; `error` is set.
    Failed,
    /// A quota gate denied execution; `error` is set.
    QuotaExceeded,
}

impl SessionStatus {
    /// Whether no further transition can occur from this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::QuotaExceeded
        )
    }

    /// Whether `self -> next` appears in the transition table.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Queued, SessionStatus::Running)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Running, SessionStatus::Failed)
                | (SessionStatus::Running, SessionStatus::QuotaExceeded)
        )
    }

    /// Wire name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::QuotaExceeded => "quota_exceeded",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one executed (or denied) pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The stage produced an output.
    Completed,
    /// The stage failed after its retry budget, or was cancelled.
    Failed,
    /// A quota gate refused the stage before it ran.
    Denied,
}

/// One entry in a session's append-only step history.
///
/// Insertion order is execution order. Once appended, `stage_name` and
/// `started_at` never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Name of the stage this entry summarizes.
    pub stage_name: String,

    /// How the stage concluded.
    pub status: StepStatus,

    /// When the stage (or its denial) began.
    pub started_at: DateTime<Utc>,

    /// When the stage concluded.
    pub finished_at: DateTime<Utc>,

    /// Human-readable summary (attempt counts, denial reason, failure text).
    pub detail: String,
}

/// Durable record of one unit of work, mutated only by its own
/// orchestration loop and immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque unique identifier, assigned at creation.
    pub id: SessionId,

    /// Owning user.
    pub user_id: UserId,

    /// Request kind.
    pub kind: SessionKind,

    /// Current lifecycle status.
    pub status: SessionStatus,

    /// Append-only step history in execution order.
    pub steps: Vec<StepRecord>,

    /// Terminal output payload, set exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Failure summary; present exactly when status is failed or quota_exceeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The validated submit payload, retained for inspection and replay.
    pub request: serde_json::Value,

    /// Admission timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a freshly admitted session in `queued`.
    pub fn new(user_id: UserId, kind: SessionKind, request: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            user_id,
            kind,
            status: SessionStatus::Queued,
            steps: Vec::new(),
            result: None,
            error: None,
            request,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the session reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, rejecting anything outside the transition table.
    pub fn transition(&mut self, next: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append a step summary. Rejected once the session is terminal.
    pub fn push_step(&mut self, step: StepRecord) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(SessionError::TerminalImmutable(self.id.to_string()));
        }
        self.steps.push(step);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Finalize as `completed` with the pipeline's terminal output.
    pub fn finalize_completed(&mut self, result: serde_json::Value) -> Result<(), SessionError> {
        if self.result.is_some() {
            return Err(SessionError::ResultAlreadySet(self.id.to_string()));
        }
        self.transition(SessionStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Finalize as `failed` with a displayable reason.
    pub fn finalize_failed(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.transition(SessionStatus::Failed)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Finalize as `quota_exceeded` with the denial reason.
    pub fn finalize_quota_exceeded(
        &mut self,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.transition(SessionStatus::QuotaExceeded)?;
        self.error = Some(reason.into());
        Ok(())
    }
}
