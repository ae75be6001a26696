//! Live event streaming over WebSocket
//!
//! `GET /live/{id}` upgrades to a WebSocket delivering the session's
//! events until terminal or disconnect. Ownership is checked at connect
//! time. For a session that is already terminal with no live channel, one
//! terminal frame synthesized from the store is sent and the socket
//! closed; when a live channel exists its replay window already carries
//! the terminal event, so a fresh subscriber never sees it twice.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use leseance::{SessionId, SessionRecord};

use crate::auth::bearer_token;
use crate::error::{ApiError, ApiResult};
use crate::handlers::AppState;

/// Query parameters for the live endpoint
#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    /// Identity token for clients that cannot set headers on upgrade
    pub token: Option<String>,
}

/// GET /live/:id - upgrade to a live event stream
pub async fn live_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LiveQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(params.token)
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let user = state.verifier.verify(&token)?;

    let session_id = SessionId::from_string(id);
    let record = state
        .store
        .get(&session_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("session {session_id}")))?;
    if record.user_id != user {
        return Err(ApiError::forbidden("session belongs to another user"));
    }

    // Once the channel is gone the store is authoritative; a single
    // synthesized terminal frame replaces the stream.
    let synthesize_terminal = record.is_terminal() && !state.bus.is_active(&session_id);

    Ok(ws.on_upgrade(move |socket| {
        stream_session(socket, state, session_id, record, synthesize_terminal)
    }))
}

async fn stream_session(
    mut socket: WebSocket,
    state: AppState,
    session_id: SessionId,
    record: SessionRecord,
    synthesize_terminal: bool,
) {
    if synthesize_terminal {
        let frame = json!({
            "session_id": session_id,
            "sequence": record.steps.len() as u64,
            "kind": "session_terminal",
            "payload": {
                "status": record.status.as_str(),
                "error": record.error,
                "result": record.result,
            },
            "timestamp": record.updated_at,
        });
        let _ = socket.send(Message::Text(frame.to_string())).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let mut stream = state.bus.subscribe(&session_id);
    loop {
        tokio::select! {
            maybe_event = stream.next() => match maybe_event {
                Some(event) => {
                    let terminal = event.kind.is_terminal();
                    if socket.send(Message::Text(event.to_json())).await.is_err() {
                        debug!(session = %session_id, "live subscriber went away");
                        return;
                    }
                    if terminal {
                        break;
                    }
                }
                None => {
                    if stream.lagged() {
                        warn!(session = %session_id, "live subscriber lagged; disconnecting");
                        let frame = json!({
                            "kind": "lagged",
                            "message": "event buffer overflow; refetch the session record",
                        });
                        let _ = socket.send(Message::Text(frame.to_string())).await;
                    }
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                // Clients may ping or send keep-alives; only close ends us.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(session = %session_id, "live subscriber disconnected");
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
