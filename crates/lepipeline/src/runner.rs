//! Timeout/retry execution of one stage invocation
//!
//! Each attempt runs on its own task so a deadline miss abandons the work
//! instead of interrupting it: the spawned future may run to completion in
//! the background, but its result is never consumed. A panicking stage is
//! caught at the join boundary and reported as a failure, never unwinding
//! into the orchestration loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use leflux::{EventKind, EventSink};

use crate::contract::{Stage, StageContext};
use crate::failure::StageError;

/// Summary of one driven stage invocation, retries included.
#[derive(Debug)]
pub struct StageOutcome {
    /// Name of the executed stage.
    pub stage_name: String,

    /// Attempts consumed, including the final one.
    pub attempts: u32,

    /// When the first attempt began.
    pub started_at: DateTime<Utc>,

    /// When the final attempt concluded.
    pub finished_at: DateTime<Utc>,

    /// Output payload, or the failure that exhausted the retry budget.
    pub result: Result<Value, StageError>,
}

impl StageOutcome {
    /// Displayable step-history summary.
    pub fn detail(&self) -> String {
        let elapsed = (self.finished_at - self.started_at).num_milliseconds().max(0);
        match &self.result {
            Ok(_) => format!(
                "completed in {}ms after {} attempt(s)",
                elapsed, self.attempts
            ),
            Err(e) => format!("{} after {} attempt(s)", e, self.attempts),
        }
    }
}

/// Executes stage invocations with bounded duration and declared retries.
pub struct StageRunner {
    sink: Arc<dyn EventSink>,
}

impl StageRunner {
    /// Create a runner publishing per-attempt progress to `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Drive one stage to a terminal outcome.
    pub async fn execute(&self, stage: Arc<dyn Stage>, ctx: &StageContext) -> StageOutcome {
        let policy = stage.policy();
        let max_attempts = policy.max_attempts.max(1);
        let started_at = Utc::now();
        let mut attempt = 0u32;

        let failure = loop {
            attempt += 1;

            let handle = {
                let stage = Arc::clone(&stage);
                let ctx = ctx.clone();
                tokio::spawn(async move { stage.run(ctx).await })
            };

            let result = match tokio::time::timeout(policy.timeout, handle).await {
                // Deadline miss: the handle is dropped and the spawned work
                // abandoned; whatever it still produces is never consumed.
                Err(_) => Err(StageError::Timeout(policy.timeout)),
                Ok(Err(join_err)) => {
                    warn!(stage = stage.name(), error = %join_err, "stage task aborted");
                    Err(StageError::domain(format!("stage panicked: {join_err}")))
                }
                Ok(Ok(result)) => result,
            };

            match result {
                Ok(output) => {
                    debug!(stage = stage.name(), attempt, "stage succeeded");
                    return StageOutcome {
                        stage_name: stage.name().to_string(),
                        attempts: attempt,
                        started_at,
                        finished_at: Utc::now(),
                        result: Ok(output),
                    };
                }
                Err(failure) => {
                    let retryable = failure.retryable_by_default()
                        || (matches!(failure, StageError::Domain(_))
                            && policy.retry_domain_failures);
                    if retryable && attempt < max_attempts {
                        self.sink.publish(
                            &ctx.session_id,
                            EventKind::StageProgress,
                            json!({
                                "stage": stage.name(),
                                "attempt": attempt,
                                "max_attempts": max_attempts,
                                "error": failure.to_string(),
                                "retrying": true,
                            }),
                        );
                        tokio::time::sleep(policy.backoff).await;
                        continue;
                    }
                    break failure;
                }
            }
        };

        warn!(stage = stage.name(), attempts = attempt, error = %failure, "stage failed");
        StageOutcome {
            stage_name: stage.name().to_string(),
            attempts: attempt,
            started_at,
            finished_at: Utc::now(),
            result: Err(failure),
        }
    }
}
