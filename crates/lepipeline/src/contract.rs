//! Stage trait, execution policy, and shared context

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use lequota::Capability;
use leseance::{SessionId, SessionKind, UserId};

use crate::failure::StageError;

/// Declared execution bounds for one stage.
#[derive(Debug, Clone, Copy)]
pub struct StagePolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,

    /// Total attempts for retryable failures. `1` means never retried.
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    pub backoff: Duration,

    /// Retry domain failures too, not just timeouts and infrastructure.
    pub retry_domain_failures: bool,

    /// Capability consumed before this stage may run, if any.
    pub quota: Option<Capability>,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            backoff: Duration::from_millis(150),
            retry_domain_failures: false,
            quota: None,
        }
    }
}

/// Input handed to every stage of one session.
///
/// `scratch` accumulates prior stage outputs keyed by stage name, so a
/// stage can read what its predecessors produced without the stages
/// knowing about each other.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Owning session.
    pub session_id: SessionId,

    /// Requesting user.
    pub user_id: UserId,

    /// Request kind the pipeline was resolved for.
    pub kind: SessionKind,

    /// The validated submit payload.
    pub request: Value,

    /// Outputs of already-completed stages, keyed by stage name.
    pub scratch: Value,
}

impl StageContext {
    /// Fresh context at pipeline start.
    pub fn new(session_id: SessionId, user_id: UserId, kind: SessionKind, request: Value) -> Self {
        Self {
            session_id,
            user_id,
            kind,
            request,
            scratch: Value::Object(serde_json::Map::new()),
        }
    }

    /// Output of an earlier stage, if it ran.
    pub fn output_of(&self, stage_name: &str) -> Option<&Value> {
        self.scratch.get(stage_name)
    }

    /// Record a completed stage's output for later stages.
    pub fn record_output(&mut self, stage_name: &str, output: Value) {
        if let Value::Object(map) = &mut self.scratch {
            map.insert(stage_name.to_string(), output);
        }
    }
}

/// One opaque, pluggable unit of computation within a pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable stage name, used in step history and events.
    fn name(&self) -> &'static str;

    /// Execution bounds; the default policy suits cheap local stages.
    fn policy(&self) -> StagePolicy {
        StagePolicy::default()
    }

    /// Execute one invocation. Failures are reported, never panicked.
    async fn run(&self, ctx: StageContext) -> Result<Value, StageError>;
}
