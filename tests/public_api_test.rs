mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use common::{harness, Harness, TestOptions};
use proctor_backend::{models::question::QuestionType, routes::build_router, utils::time::Clock};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    build_router(h.state.clone())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.20")
        .header("user-agent", "oneshot");
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn multipart_body(boundary: &str, field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn candidate_flow_end_to_end() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let q1 = h
        .add_question(test.id, QuestionType::Mcq, 1, Some(vec!["A", "B", "C"]), json!(["A", "B"]))
        .await;
    let _q2 = h
        .add_question(test.id, QuestionType::Single, 3, Some(vec!["X", "Y"]), json!("Y"))
        .await;
    let invite = h.invite(test.id, Some("cand@example.com"), 1, None).await;
    let app = app(&h);
    let token = &invite.invite_token;

    let (status, body) = send(&app, "GET", &format!("/api/public/invites/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["test"]["question_count"], 2);
    assert_eq!(body["guest"], false);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/public/invites/{token}/verify"),
        Some(json!({"email": "someone.else@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "identity_mismatch");
    assert_eq!(body["assigned_email"], "c**d@example.com");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/public/invites/{token}/verify"),
        Some(json!({"email": "CAND@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/public/assignments/{}/start", invite.assignment.id),
        Some(json!({"consent_accepted": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["attempt"]["status"], "in_progress");
    assert_eq!(body["attempt"]["metadata"]["ip"], "198.51.100.20");
    assert!(body["questions"][0].get("correct_answer").is_none());
    let attempt_id = body["attempt"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/public/attempts/{attempt_id}/answer"),
        Some(json!({"question_id": q1.id, "answer_data": ["b", "a"], "time_taken_ms": 4200})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], true);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/public/attempts/{attempt_id}/events"),
        Some(json!({"event_type": "tab_switch", "event_data": {"hidden_ms": 800}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["flagged"], false);

    h.clock.advance(Duration::seconds(45));
    let (status, body) = send(&app, "GET", &format!("/api/public/attempts/{attempt_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining_seconds"], 555);
    assert_eq!(body["answers"].as_array().map(Vec::len), Some(1));

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/public/attempts/{attempt_id}/submit"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["score"], 25.0);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/public/attempts/{attempt_id}/submit"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");

    let (status, body) = send(&app, "GET", &format!("/api/public/invites/{token}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "max_attempts_reached");
}

#[tokio::test]
async fn unknown_and_expired_invites() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let invite = h
        .invite(test.id, None, 1, Some(h.clock.now() + Duration::hours(1)))
        .await;
    let app = app(&h);

    let (status, body) = send(&app, "GET", "/api/public/invites/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    h.clock.advance(Duration::hours(2));
    let uri = format!("/api/public/invites/{}", invite.invite_token);
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "invite_expired");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/public/assignments/{}/start", invite.assignment.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let invite = h.invite(test.id, None, 1, None).await;
    let app = app(&h);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/public/invites/{}/verify", invite.invite_token),
        Some(json!({"email": "not-an-email"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(
        &app,
        "POST",
        &format!("/api/public/assignments/{}/start", invite.assignment.id),
        None,
    )
    .await;
    let attempt_id = body["attempt"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/public/attempts/{attempt_id}/events"),
        Some(json!({"event_type": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recording_upload_over_multipart() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let invite = h.invite(test.id, None, 1, None).await;
    let app = app(&h);

    let (_, body) = send(
        &app,
        "POST",
        &format!("/api/public/assignments/{}/start", invite.assignment.id),
        None,
    )
    .await;
    let attempt_id = body["attempt"]["id"].as_str().unwrap().to_string();

    let boundary = "proctor-boundary";
    let upload = |field: &str, name: &str, mime: &str, data: &[u8]| {
        Request::builder()
            .method("POST")
            .uri(format!("/api/public/attempts/{attempt_id}/recording"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(multipart_body(boundary, field, name, mime, data)))
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(upload("frame", "frame.jpg", "image/jpeg", b"jpeg bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let recording: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(recording["size_bytes"], 10);

    let response = app
        .clone()
        .oneshot(upload("recording", "notes.txt", "text/plain", b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(upload("attachment", "frame.png", "image/png", b"png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, body) = send(&app(&h), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
