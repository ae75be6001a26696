//! HTTP handlers for REST endpoints

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use leflux::EventBus;
use lepilote::Orchestrator;
use lepipeline::ObjectStore;
use lequota::{Capability, QuotaLedger};
use leseance::{SessionId, SessionKind, SessionRecord, SessionStore, UserId};

use crate::auth::{authenticate, IdentityVerifier};
use crate::config::ServeurConfig;
use crate::error::{ApiError, ApiResult};
use crate::responses::{
    CancelResponse, LogsResponse, QuotaResponse, SessionListResponse, SubmitResponse,
    UploadResponse,
};
use crate::websocket;

/// Default and maximum page sizes for session listing
const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

/// State shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Session admission, execution, and cancellation
    pub orchestrator: Arc<Orchestrator>,

    /// Durable session records
    pub store: Arc<dyn SessionStore>,

    /// Live event fan-out
    pub bus: Arc<EventBus>,

    /// Identity token verification
    pub verifier: Arc<dyn IdentityVerifier>,

    /// Quota standing for the quota endpoint
    pub ledger: Arc<QuotaLedger>,

    /// Upload storage
    pub objects: Arc<dyn ObjectStore>,

    /// Immutable server configuration
    pub config: Arc<ServeurConfig>,
}

/// Body of `POST /sessions`
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Request kind selecting the pipeline
    pub kind: Value,

    /// Kind-specific payload
    #[serde(default)]
    pub payload: Value,
}

/// Query parameters for `GET /sessions`
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Maximum number of sessions to return
    pub limit: Option<usize>,
}

/// Query parameters for `POST /uploads`
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Object name, may contain subdirectories
    pub name: String,
}

/// Fetch a session, enforcing that `user` owns it.
pub(crate) async fn owned_session(
    state: &AppState,
    id: &SessionId,
    user: &UserId,
) -> ApiResult<SessionRecord> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("session {id}")))?;
    if &record.user_id != user {
        return Err(ApiError::forbidden("session belongs to another user"));
    }
    Ok(record)
}

/// POST /sessions - admit a new session
pub async fn submit_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let user = authenticate(state.verifier.as_ref(), &headers)?;
    let kind: SessionKind = serde_json::from_value(request.kind)
        .map_err(|_| ApiError::bad_request("unknown session kind"))?;

    let session_id = state
        .orchestrator
        .submit(user, kind, request.payload)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            session_id: session_id.to_string(),
            status: "queued".to_string(),
        }),
    ))
}

/// GET /sessions - the caller's sessions, newest first
pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<SessionListResponse>> {
    let user = authenticate(state.verifier.as_ref(), &headers)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

    let sessions = state.store.list_for_user(&user, limit).await?;
    let total = sessions.len();
    Ok(Json(SessionListResponse { sessions, total }))
}

/// GET /sessions/:id - one session record
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRecord>> {
    let user = authenticate(state.verifier.as_ref(), &headers)?;
    let record = owned_session(&state, &SessionId::from_string(id), &user).await?;
    Ok(Json(record))
}

/// GET /sessions/:id/logs - step history as display lines
pub async fn session_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<LogsResponse>> {
    let user = authenticate(state.verifier.as_ref(), &headers)?;
    let record = owned_session(&state, &SessionId::from_string(id), &user).await?;
    Ok(Json(LogsResponse {
        session_id: record.id.to_string(),
        lines: render_log_lines(&record),
    }))
}

/// POST /sessions/:id/cancel - cooperative cancellation
pub async fn cancel_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<CancelResponse>)> {
    let user = authenticate(state.verifier.as_ref(), &headers)?;
    let session_id = SessionId::from_string(id);
    owned_session(&state, &session_id, &user).await?;

    let cancelled = state.orchestrator.cancel(&session_id);
    info!(session = %session_id, cancelled, "cancellation request handled");
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            session_id: session_id.to_string(),
            cancelled,
        }),
    ))
}

/// GET /quota - the caller's remaining capacity per capability
pub async fn quota(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<QuotaResponse>> {
    let user = authenticate(state.verifier.as_ref(), &headers)?;
    let capabilities = Capability::all()
        .into_iter()
        .map(|capability| state.ledger.snapshot(&user, capability))
        .collect();
    Ok(Json(QuotaResponse {
        user_id: user.to_string(),
        capabilities,
    }))
}

/// POST /uploads - store a media attachment, returning its URI
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let user = authenticate(state.verifier.as_ref(), &headers)?;
    if body.is_empty() {
        return Err(ApiError::bad_request("upload body must not be empty"));
    }

    let name = format!("uploads/{}/{}", user, params.name);
    let uri = state.objects.put(&name, &body).await?;
    info!(user = %user, object = %name, bytes = body.len(), "upload stored");
    Ok((StatusCode::CREATED, Json(UploadResponse { uri })))
}

/// GET /api/health - liveness probe, no auth required
pub async fn health_check(State(_state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "lementor",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// GET /api/features - supported request kinds, no auth required
pub async fn features(State(_state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(serde_json::json!({
        "features": {
            "video-generation": {
                "name": "AI Video Generation",
                "requirements": ["prompt", "image_uri", "audio_uri"],
            },
            "voice-clone": {
                "name": "Voice Cloning",
                "requirements": ["text", "reference_audio_uri"],
            },
            "syllabus": {
                "name": "Dynamic Syllabus Generator",
                "requirements": ["course_info", "learning_objectives"],
            },
            "course-schedule": {
                "name": "Smart Course Scheduler",
                "requirements": ["courses", "semester_start", "semester_end"],
            },
            "analytics-query": {
                "name": "Learning Analytics",
                "requirements": ["metrics"],
            },
        },
        "endpoints": ["/sessions", "/sessions/{id}", "/live/{id}", "/quota", "/uploads"],
    })))
}

/// Render a session's step history for the logs endpoint.
fn render_log_lines(record: &SessionRecord) -> Vec<String> {
    let mut lines = Vec::with_capacity(record.steps.len() + 2);
    lines.push(format!(
        "[{}] session {} admitted ({})",
        record.created_at.to_rfc3339(),
        record.id,
        record.kind
    ));
    for step in &record.steps {
        lines.push(format!(
            "[{}] stage {} {:?}: {}",
            step.started_at.to_rfc3339(),
            step.stage_name,
            step.status,
            step.detail
        ));
    }
    if record.is_terminal() {
        let summary = record.error.as_deref().unwrap_or("ok");
        lines.push(format!(
            "[{}] session {} ({})",
            record.updated_at.to_rfc3339(),
            record.status,
            summary
        ));
    }
    lines
}

/// Create router with all API endpoints
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/health", axum::routing::get(health_check))
        .route("/api/features", axum::routing::get(features))
        .route(
            "/sessions",
            axum::routing::post(submit_session).get(list_sessions),
        )
        .route("/sessions/:id", axum::routing::get(get_session))
        .route("/sessions/:id/logs", axum::routing::get(session_logs))
        .route("/sessions/:id/cancel", axum::routing::post(cancel_session))
        .route("/quota", axum::routing::get(quota))
        .route("/uploads", axum::routing::post(upload))
        .route("/live/:id", axum::routing::get(websocket::live_events))
}
