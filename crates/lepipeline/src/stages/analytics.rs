//! Usage aggregation stage

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use leseance::{SessionStatus, SessionStore};

use crate::contract::{Stage, StageContext, StagePolicy};
use crate::failure::StageError;

/// History depth the aggregation reads.
const HISTORY_LIMIT: usize = 100;

/// Aggregates the caller's session history into dashboard data.
///
/// The one stage allowed a read-only handle on the session store.
pub struct AggregateUsageStage {
    store: Arc<dyn SessionStore>,
}

impl AggregateUsageStage {
    /// Create the stage reading history from `store`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for AggregateUsageStage {
    fn name(&self) -> &'static str {
        "aggregate_usage"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy {
            timeout: Duration::from_secs(30),
            ..StagePolicy::default()
        }
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let sessions = self
            .store
            .list_for_user(&ctx.user_id, HISTORY_LIMIT)
            .await
            .map_err(|e| StageError::infrastructure(format!("session store: {e}")))?;

        let total = sessions.len();
        let completed = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .count();
        let mut by_kind: BTreeMap<&str, u64> = BTreeMap::new();
        let mut by_status: BTreeMap<&str, u64> = BTreeMap::new();
        for session in &sessions {
            *by_kind.entry(session.kind.as_str()).or_default() += 1;
            *by_status.entry(session.status.as_str()).or_default() += 1;
        }
        let success_rate = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let mut insights = Vec::new();
        if total > 0 {
            insights.push(format!("Your success rate is {success_rate:.1}%"));
            if let Some((kind, count)) = by_kind.iter().max_by_key(|(_, c)| **c) {
                insights.push(format!("Most used service: {kind} ({count} sessions)"));
            }
        }

        let mut recommendations = vec![
            "Try different services to vary your learning material".to_string(),
            "Upload high-quality reference media for better results".to_string(),
        ];
        let videos = by_kind.get("video-generation").copied().unwrap_or(0);
        let schedules = by_kind.get("course-schedule").copied().unwrap_or(0);
        if videos > schedules {
            recommendations
                .push("Consider the course scheduler to organize your studies".to_string());
        }

        Ok(json!({
            "data": {
                "total_sessions": total,
                "completed_sessions": completed,
                "success_rate": success_rate,
                "by_kind": by_kind,
                "by_status": by_status,
            },
            "insights": insights,
            "recommendations": recommendations,
        }))
    }
}
