use std::collections::HashMap;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use leserveur::{LeMentorServer, ServeurConfig};

fn test_config(dir: &tempfile::TempDir) -> ServeurConfig {
    let mut api_tokens = HashMap::new();
    api_tokens.insert("tok-alice".to_string(), "alice".to_string());
    api_tokens.insert("tok-bob".to_string(), "bob".to_string());
    ServeurConfig {
        data_dir: dir.path().join("sessions").display().to_string(),
        media_dir: dir.path().join("media").display().to_string(),
        api_tokens,
        ..Default::default()
    }
}

fn test_server() -> (LeMentorServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = LeMentorServer::new(test_config(&dir)).expect("server");
    (server, dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn wait_for_terminal(server: &LeMentorServer, id: &str, token: &str) -> Value {
    for _ in 0..1000 {
        let response = server
            .app()
            .oneshot(get(&format!("/sessions/{id}"), Some(token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let record = body_json(response).await;
        let status = record["status"].as_str().expect("status");
        if status != "queued" && status != "running" {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {id} never reached a terminal status");
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (server, _dir) = test_server();
    let response = server
        .app()
        .oneshot(get("/api/health", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["service"], json!("lementor"));
}

#[tokio::test]
async fn submitting_without_a_token_is_unauthorized() {
    let (server, _dir) = test_server();
    let response = server
        .app()
        .oneshot(post_json(
            "/sessions",
            None,
            json!({"kind": "voice-clone", "payload": {}}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_payload_is_rejected_with_400() {
    let (server, _dir) = test_server();
    let response = server
        .app()
        .oneshot(post_json(
            "/sessions",
            Some("tok-alice"),
            json!({"kind": "video-generation", "payload": {"image_uri": "/m/i.jpg"}}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn unknown_kind_is_rejected_with_400() {
    let (server, _dir) = test_server();
    let response = server
        .app()
        .oneshot(post_json(
            "/sessions",
            Some("tok-alice"),
            json!({"kind": "mind-reading", "payload": {}}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voice_clone_session_runs_to_completion_over_http() {
    let (server, _dir) = test_server();

    let response = server
        .app()
        .oneshot(post_json(
            "/sessions",
            Some("tok-alice"),
            json!({
                "kind": "voice-clone",
                "payload": {
                    "text": "hello from the clone",
                    "reference_audio_uri": "/media/uploads/ref.wav",
                },
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("queued"));
    let id = body["session_id"].as_str().expect("session id").to_string();

    let record = wait_for_terminal(&server, &id, "tok-alice").await;
    assert_eq!(record["status"], json!("completed"));
    let audio_url = record["result"]["audio_url"].as_str().expect("audio url");
    assert!(audio_url.starts_with("/media/voice_clone_"));

    // The step history is exposed as display lines.
    let response = server
        .app()
        .oneshot(get(&format!("/sessions/{id}/logs"), Some("tok-alice")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let logs = body_json(response).await;
    assert!(!logs["lines"].as_array().expect("lines").is_empty());

    // And the listing contains the session.
    let response = server
        .app()
        .oneshot(get("/sessions?limit=10", Some("tok-alice")))
        .await
        .expect("response");
    let listing = body_json(response).await;
    assert!(listing["total"].as_u64().expect("total") >= 1);
}

#[tokio::test]
async fn sessions_are_owner_scoped() {
    let (server, _dir) = test_server();

    let response = server
        .app()
        .oneshot(post_json(
            "/sessions",
            Some("tok-alice"),
            json!({
                "kind": "voice-clone",
                "payload": {
                    "text": "private clip",
                    "reference_audio_uri": "/media/uploads/ref.wav",
                },
            }),
        ))
        .await
        .expect("response");
    let id = body_json(response).await["session_id"]
        .as_str()
        .expect("session id")
        .to_string();

    let response = server
        .app()
        .oneshot(get(&format!("/sessions/{id}"), Some("tok-bob")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (server, _dir) = test_server();
    let response = server
        .app()
        .oneshot(get("/sessions/does-not-exist", Some("tok-alice")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quota_endpoint_reports_both_capabilities() {
    let (server, _dir) = test_server();
    let response = server
        .app()
        .oneshot(get("/quota", Some("tok-alice")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], json!("alice"));
    assert_eq!(body["capabilities"].as_array().expect("caps").len(), 2);
}

#[tokio::test]
async fn uploads_are_stored_and_served_from_media() {
    let (server, _dir) = test_server();

    let request = Request::builder()
        .method("POST")
        .uri("/uploads?name=ref.wav")
        .header(header::AUTHORIZATION, "Bearer tok-alice")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from("RIFF-bytes"))
        .expect("request");
    let response = server.app().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let uri = body_json(response).await["uri"]
        .as_str()
        .expect("uri")
        .to_string();
    assert_eq!(uri, "/media/uploads/alice/ref.wav");

    let response = server
        .app()
        .oneshot(get(&uri, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
