//! The orchestration loop
//!
//! One tokio task per admitted session is the sole mutator of that
//! session's record. Within the task, stages run strictly sequentially;
//! cancellation is observed only at stage boundaries; a stage failure or
//! quota denial finalizes the session and stops the loop. Only a session
//! store or event bus malfunction aborts orchestration, and it is logged,
//! never panicked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use leflux::{EventKind, EventSink};
use lepipeline::{StageContext, StageError, StageRunner};
use lequota::{QuotaDecision, QuotaLedger};
use leseance::{
    validate_payload, SessionError, SessionId, SessionKind, SessionRecord, SessionStatus,
    SessionStore, StepRecord, StepStatus, StoreError, UserId,
};

use crate::error::SubmitError;
use crate::pipelines::PipelineSet;

/// Failures that abort an in-flight orchestration loop.
#[derive(Debug, Error)]
enum LoopError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

struct Inner {
    store: Arc<dyn SessionStore>,
    ledger: Arc<QuotaLedger>,
    sink: Arc<dyn EventSink>,
    pipelines: Arc<PipelineSet>,
    runner: StageRunner,
    active: Mutex<HashMap<SessionId, CancellationToken>>,
}

/// Owns session admission, execution, and cancellation. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Wire an orchestrator to its collaborators.
    pub fn new(
        store: Arc<dyn SessionStore>,
        ledger: Arc<QuotaLedger>,
        sink: Arc<dyn EventSink>,
        pipelines: Arc<PipelineSet>,
    ) -> Self {
        let runner = StageRunner::new(Arc::clone(&sink));
        Self {
            inner: Arc::new(Inner {
                store,
                ledger,
                sink,
                pipelines,
                runner,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of stages the pipeline for `kind` runs.
    pub fn pipeline_len(&self, kind: SessionKind) -> usize {
        self.inner.pipelines.stage_count(kind)
    }

    /// Validate, persist as `queued`, and schedule asynchronous execution.
    ///
    /// Returns immediately with the session id; the record exists in the
    /// store before this returns.
    pub async fn submit(
        &self,
        user_id: UserId,
        kind: SessionKind,
        payload: Value,
    ) -> Result<SessionId, SubmitError> {
        validate_payload(kind, &payload)?;

        let record = SessionRecord::new(user_id, kind, payload);
        self.inner.store.put(&record).await?;
        info!(session = %record.id, %kind, user = %record.user_id, "session admitted");

        let cancel = CancellationToken::new();
        self.inner
            .active
            .lock()
            .expect("orchestrator mutex poisoned")
            .insert(record.id.clone(), cancel.clone());

        let id = record.id.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(Inner::run_session(inner, record, cancel));
        Ok(id)
    }

    /// Mark a queued/running session for cooperative cancellation.
    ///
    /// Returns whether a live session was marked. The loop observes the
    /// mark at its next stage boundary; in-flight stage work is abandoned,
    /// never interrupted.
    pub fn cancel(&self, id: &SessionId) -> bool {
        let active = self
            .inner
            .active
            .lock()
            .expect("orchestrator mutex poisoned");
        match active.get(id) {
            Some(token) => {
                token.cancel();
                info!(session = %id, "cancellation requested");
                true
            }
            None => false,
        }
    }
}

impl Inner {
    async fn run_session(inner: Arc<Inner>, mut record: SessionRecord, cancel: CancellationToken) {
        let session_id = record.id.clone();
        if let Err(e) = inner.drive(&mut record, &cancel).await {
            // Store/bus malfunction: the one failure class allowed to
            // abort orchestration. Leave a best-effort terminal record.
            error!(session = %session_id, error = %e, "orchestration aborted");
            if !record.is_terminal()
                && record
                    .finalize_failed(format!("orchestration aborted: {e}"))
                    .is_ok()
            {
                if let Err(put_err) = inner.store.put(&record).await {
                    error!(session = %session_id, error = %put_err, "failed to persist aborted session");
                }
            }
        }
        inner
            .active
            .lock()
            .expect("orchestrator mutex poisoned")
            .remove(&session_id);
    }

    async fn drive(
        &self,
        record: &mut SessionRecord,
        cancel: &CancellationToken,
    ) -> Result<(), LoopError> {
        record.transition(SessionStatus::Running)?;
        self.store.put(record).await?;

        let stages = self.pipelines.for_kind(record.kind);
        let total = stages.len();
        let mut ctx = StageContext::new(
            record.id.clone(),
            record.user_id.clone(),
            record.kind,
            record.request.clone(),
        );
        let mut final_output = Value::Null;

        for (index, stage) in stages.iter().enumerate() {
            // Cancellation is cooperative: stage boundaries only.
            if cancel.is_cancelled() {
                let now = Utc::now();
                record.push_step(StepRecord {
                    stage_name: stage.name().to_string(),
                    status: StepStatus::Failed,
                    started_at: now,
                    finished_at: now,
                    detail: "cancelled before execution".to_string(),
                })?;
                record.finalize_failed("cancelled")?;
                self.store.put(record).await?;
                self.publish_terminal(record);
                return Ok(());
            }

            if let Some(capability) = stage.policy().quota {
                if let QuotaDecision::Exceeded { reason } =
                    self.ledger.check_and_increment(&record.user_id, capability)
                {
                    warn!(session = %record.id, %capability, "quota gate denied session");
                    let now = Utc::now();
                    record.push_step(StepRecord {
                        stage_name: stage.name().to_string(),
                        status: StepStatus::Denied,
                        started_at: now,
                        finished_at: now,
                        detail: reason.clone(),
                    })?;
                    record.finalize_quota_exceeded(reason)?;
                    self.store.put(record).await?;
                    self.publish_terminal(record);
                    return Ok(());
                }
            }

            self.sink.publish(
                &record.id,
                EventKind::StageStarted,
                json!({"stage": stage.name(), "index": index, "of": total}),
            );

            let outcome = self.runner.execute(Arc::clone(stage), &ctx).await;
            let detail = outcome.detail();
            match outcome.result {
                Ok(output) => {
                    record.push_step(StepRecord {
                        stage_name: outcome.stage_name.clone(),
                        status: StepStatus::Completed,
                        started_at: outcome.started_at,
                        finished_at: outcome.finished_at,
                        detail,
                    })?;
                    self.store.put(record).await?;
                    self.sink.publish(
                        &record.id,
                        EventKind::StageCompleted,
                        json!({
                            "stage": outcome.stage_name,
                            "index": index,
                            "attempts": outcome.attempts,
                        }),
                    );
                    ctx.record_output(stage.name(), output.clone());
                    final_output = output;
                }
                Err(failure) => {
                    record.push_step(StepRecord {
                        stage_name: outcome.stage_name.clone(),
                        status: StepStatus::Failed,
                        started_at: outcome.started_at,
                        finished_at: outcome.finished_at,
                        detail,
                    })?;
                    self.sink.publish(
                        &record.id,
                        EventKind::StageFailed,
                        json!({
                            "stage": outcome.stage_name,
                            "attempts": outcome.attempts,
                            "error": failure.to_string(),
                        }),
                    );
                    // Domain failures surface verbatim; the rest carry
                    // the stage name for context.
                    let summary = match &failure {
                        StageError::Domain(message) => message.clone(),
                        other => format!("stage {} {}", outcome.stage_name, other),
                    };
                    record.finalize_failed(summary)?;
                    self.store.put(record).await?;
                    self.publish_terminal(record);
                    return Ok(());
                }
            }
        }

        record.finalize_completed(final_output)?;
        self.store.put(record).await?;
        self.publish_terminal(record);
        info!(session = %record.id, "session completed");
        Ok(())
    }

    fn publish_terminal(&self, record: &SessionRecord) {
        self.sink.publish(
            &record.id,
            EventKind::SessionTerminal,
            json!({
                "status": record.status.as_str(),
                "error": record.error,
                "result": record.result,
            }),
        );
    }
}
