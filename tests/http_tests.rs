// HTTP-level tests using tower::ServiceExt::oneshot against the full router
//
// Each test builds a fresh router over in-memory stores and checks status
// codes and JSON bodies, including the error-kind mapping.

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{harness, plan, wav_bytes, Harness, MAX_AUDIO_BYTES};
use http_body_util::BodyExt;
use intentx_sessions::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "intentx-test-boundary";

fn router(h: &Harness) -> Router {
    create_router(AppState::new(h.coordinator.clone(), MAX_AUDIO_BYTES))
}

fn json_request(method: Method, uri: &str, body: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body)?))?)
}

fn empty_request(method: Method, uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())?)
}

fn audio_request(uri: &str, audio: &[u8]) -> Result<Request<Body>> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"audio\"; filename=\"clip.wav\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Ok(Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))?)
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    Ok((status, json))
}

async fn start(app: &Router, user_id: &str) -> Result<(StatusCode, Value)> {
    send(
        app,
        json_request(Method::POST, "/sessions", json!({ "user_id": user_id }))?,
    )
    .await
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let h = harness(vec![plan("pro", Some(1))]);
    let (status, body) = send(&router(&h), empty_request(Method::GET, "/health")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_full_interview_over_http() -> Result<()> {
    let h = harness(vec![plan("pro", Some(3))]);
    h.subscribe("user-1", "pro").await?;
    let app = router(&h);

    let (status, body) = start(&app, "user-1").await?;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    assert!(!session_id.is_empty());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/sessions/{}/utterances", session_id),
            json!({ "sequence_no": 1, "source": "system", "text": "Tell me about yourself" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["source"], "system");

    let wav = wav_bytes(2.0, 16000)?;
    let (status, body) = send(
        &app,
        audio_request(&format!("/sessions/{}/audio", session_id), &wav)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sequence_no"], 2);
    assert_eq!(body["degraded"], false);
    assert!(!body["text"].as_str().unwrap_or_default().is_empty());

    let (status, body) = send(
        &app,
        empty_request(Method::GET, &format!("/sessions/{}/transcript", session_id))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, body) = send(
        &app,
        empty_request(Method::POST, &format!("/sessions/{}/complete", session_id))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "completed");
    assert_eq!(body["utterance_count"], 2);
    assert_eq!(body["audio_seconds"], 2.0);

    let (status, body) = send(&app, empty_request(Method::GET, "/users/user-1/quota")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consumed"], 1);
    assert_eq!(body["remaining"], 2);
    assert_eq!(body["can_start"], true);
    Ok(())
}

#[tokio::test]
async fn test_quota_exceeded_is_402() -> Result<()> {
    let h = harness(vec![plan("single", Some(1))]);
    h.subscribe("user-1", "single").await?;
    let app = router(&h);

    let (status, _) = start(&app, "user-1").await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = start(&app, "user-1").await?;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "quota_exceeded");
    assert!(body["message"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_error_kind_status_mapping() -> Result<()> {
    let h = harness(vec![plan("pro", Some(2))]);
    h.subscribe("user-1", "pro").await?;
    let app = router(&h);

    let (status, body) = start(&app, "nobody").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "subscription_inactive");

    let missing = uuid::Uuid::new_v4();
    let (status, body) = send(
        &app,
        empty_request(Method::POST, &format!("/sessions/{}/complete", missing))?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session_not_found");

    let (_, body) = start(&app, "user-1").await?;
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();

    // Empty completion is refused
    let (status, body) = send(
        &app,
        empty_request(Method::POST, &format!("/sessions/{}/complete", session_id))?,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");

    let utterance = |seq: u64| {
        json_request(
            Method::POST,
            &format!("/sessions/{}/utterances", session_id),
            json!({ "sequence_no": seq, "source": "system", "text": "Hello" }),
        )
    };
    let (status, _) = send(&app, utterance(1)?).await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&app, utterance(1)?).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "out_of_order_utterance");

    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            "/users/user-1/subscription",
            json!({ "plan_id": "platinum" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_plan");
    Ok(())
}

#[tokio::test]
async fn test_bad_uploads_are_400() -> Result<()> {
    let h = harness(vec![plan("pro", Some(2))]);
    h.subscribe("user-1", "pro").await?;
    let app = router(&h);

    let (_, body) = start(&app, "user-1").await?;
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    let uri = format!("/sessions/{}/audio", session_id);

    let (status, body) = send(&app, audio_request(&uri, &[])?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_audio");

    let (status, body) = start(&app, " ").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    Ok(())
}

#[tokio::test]
async fn test_rejected_requests_use_json_error_body() -> Result<()> {
    let h = harness(vec![plan("pro", Some(2))]);
    h.subscribe("user-1", "pro").await?;
    let app = router(&h);

    let (_, body) = start(&app, "user-1").await?;
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();

    let malformed_json = Request::builder()
        .method(Method::POST)
        .uri("/sessions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"user_id\": "))?;
    let missing_content_type = Request::builder()
        .method(Method::POST)
        .uri(format!("/sessions/{}/audio", session_id))
        .body(Body::from("audio"))?;

    let requests = vec![
        json_request(Method::POST, "/sessions", json!({}))?,
        malformed_json,
        empty_request(Method::POST, "/sessions/not-a-uuid/complete")?,
        empty_request(Method::GET, "/sessions/not-a-uuid/transcript")?,
        json_request(
            Method::POST,
            &format!("/sessions/{}/utterances", session_id),
            json!({ "sequence_no": -1, "source": "system", "text": "Hi" }),
        )?,
        audio_request(
            &format!("/sessions/{}/audio?best_effort=maybe", session_id),
            &wav_bytes(0.5, 16000)?,
        )?,
        missing_content_type,
    ];

    for request in requests {
        let uri = request.uri().to_string();
        let (status, body) = send(&app, request).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], "bad_request", "{}", uri);
        assert!(
            body["message"].as_str().is_some_and(|m| !m.is_empty()),
            "{}",
            uri
        );
    }

    // Nothing above reached the session
    let (status, body) = send(
        &app,
        empty_request(Method::GET, &format!("/sessions/{}", session_id))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "in_progress");
    assert_eq!(body["transcript"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_abort_over_http() -> Result<()> {
    let h = harness(vec![plan("pro", Some(1))]);
    h.subscribe("user-1", "pro").await?;
    let app = router(&h);

    let (_, body) = start(&app, "user-1").await?;
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    let uri = format!("/sessions/{}/abort", session_id);

    let (status, body) = send(
        &app,
        json_request(Method::POST, &uri, json!({ "reason": "network lost" }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");

    // No body, already terminal
    let (status, body) = send(&app, empty_request(Method::POST, &uri)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");

    let (status, body) = send(
        &app,
        empty_request(Method::GET, &format!("/sessions/{}", session_id))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failure_reason"], "network lost");

    // The unit came back
    let (status, _) = start(&app, "user-1").await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn test_plans_and_subscriptions() -> Result<()> {
    let h = harness(vec![
        plan("pro", Some(20)),
        plan("starter", Some(5)),
        plan("unlimited", None),
    ]);
    let app = router(&h);

    let (status, body) = send(&app, empty_request(Method::GET, "/plans")?).await?;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["plans"]
        .as_array()
        .map(|plans| plans.iter().filter_map(|p| p["id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec!["starter", "pro", "unlimited"]);

    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            "/users/user-9/subscription",
            json!({ "plan_id": "starter", "period_days": 7 }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan_id"], "starter");
    assert_eq!(body["status"], "active");

    let (status, body) = send(&app, empty_request(Method::GET, "/users/user-9/quota")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["interview_limit"], 5);

    let (status, body) = send(
        &app,
        empty_request(Method::POST, "/users/user-9/subscription/cancel")?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);
    assert_eq!(body["subscription"]["status"], "cancelled");

    let (status, body) = send(
        &app,
        empty_request(Method::POST, "/users/user-9/subscription/cancel")?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], false);

    let (status, _) = send(
        &app,
        json_request(
            Method::PUT,
            "/users/user-9/subscription",
            json!({ "plan_id": "starter", "period_days": 0 }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_list_user_sessions() -> Result<()> {
    let h = harness(vec![plan("pro", None)]);
    h.subscribe("user-1", "pro").await?;
    let app = router(&h);

    start(&app, "user-1").await?;
    start(&app, "user-1").await?;

    let (status, body) = send(&app, empty_request(Method::GET, "/users/user-1/sessions")?).await?;
    assert_eq!(status, StatusCode::OK);
    let sessions = body.as_array().cloned().unwrap_or_default();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s["state"] == "pending"));
    Ok(())
}
