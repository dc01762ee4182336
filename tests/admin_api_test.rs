mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use common::{harness, Harness, TestOptions, JWT_SECRET};
use jsonwebtoken::{encode, EncodingKey, Header};
use proctor_backend::{
    middleware::auth::{issue_admin_token, Claims},
    models::event::TAB_SWITCH,
    routes::build_router,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

fn admin_token(admin_id: Uuid) -> String {
    issue_admin_token(JWT_SECRET, admin_id, Duration::hours(1)).unwrap()
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
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

fn setup() -> (Harness, Router, String) {
    let h = harness();
    let app = build_router(h.state.clone());
    let token = admin_token(h.admin.admin_id);
    (h, app, token)
}

#[tokio::test]
async fn admin_routes_require_an_admin_token() {
    let (_h, app, _) = setup();

    let (status, body) = call(&app, "GET", "/api/admin/tests", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(&app, "GET", "/api/admin/tests", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let candidate_claims = Claims {
        sub: Uuid::new_v4().to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        role: Some("candidate".into()),
    };
    let candidate_token = encode(
        &Header::default(),
        &candidate_claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    let (status, body) = call(&app, "GET", "/api/admin/tests", Some(&candidate_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let wrong_secret = issue_admin_token("another_secret", Uuid::new_v4(), Duration::hours(1)).unwrap();
    let (status, _) = call(&app, "GET", "/api/admin/tests", Some(&wrong_secret), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authoring_and_inviting_over_http() {
    let (h, app, token) = setup();

    let (status, test) = call(
        &app,
        "POST",
        "/api/admin/tests",
        Some(&token),
        Some(json!({
            "title": "Async Rust",
            "duration_seconds": 1800,
            "block_tab_switch": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(test["auto_flag_threshold"], 3);
    let test_id = test["id"].as_str().unwrap().to_string();

    let (status, question) = call(
        &app,
        "POST",
        &format!("/api/admin/tests/{test_id}/questions"),
        Some(&token),
        Some(json!({
            "type": "mcq",
            "prompt": "Which are executors?",
            "choices": ["tokio", "serde", "async-std"],
            "correct_answer": ["tokio", "async-std"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(question["marks"], 1);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/admin/tests/{test_id}/questions"),
        Some(&token),
        Some(json!({
            "type": "single",
            "prompt": "Pick one",
            "choices": ["a", "b"],
            "correct_answer": "c"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, detail) = call(&app, "GET", &format!("/api/admin/tests/{test_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["questions"].as_array().map(Vec::len), Some(1));

    let (status, invite) = call(
        &app,
        "POST",
        "/api/admin/invites",
        Some(&token),
        Some(json!({
            "test_id": test_id,
            "email": "dev@example.com",
            "attempts_allowed": 2,
            "send_email": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invite["email_sent"], true);
    assert_eq!(invite["assignment"]["attempts_allowed"], 2);
    assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);

    let (status, listed) = call(
        &app,
        "GET",
        &format!("/api/admin/assignments?test_id={test_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["status"], "pending");
    assert_eq!(listed[0]["candidate"]["email"], "dev@example.com");

    let (status, tests) = call(&app, "GET", "/api/admin/tests", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tests[0]["question_count"], 1);
    assert_eq!(tests[0]["assignment_count"], 1);

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/admin/tests/{test_id}"),
        Some(&token),
        Some(json!({"duration_seconds": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "DELETE", &format!("/api/admin/tests/{test_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/api/admin/tests/{test_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attempts_are_scoped_to_their_owner() {
    let (h, app, token) = setup();
    let test = h.create_test(TestOptions::default()).await;
    let invite = h.invite(test.id, None, 1, None).await;
    let view = h
        .state
        .attempt_service
        .start(invite.assignment.id, h.metadata(), false)
        .await
        .unwrap();
    for _ in 0..3 {
        h.state
            .integrity_service
            .record(view.attempt.id, TAB_SWITCH, json!({}))
            .await
            .unwrap();
    }

    let (status, stats) = call(&app, "GET", "/api/admin/attempts/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["flagged"], 1);
    assert_eq!(stats["in_progress"], 1);

    let (status, listed) = call(&app, "GET", "/api/admin/attempts?flagged=true", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["test_title"], "Rust fundamentals");

    let uri = format!("/api/admin/attempts/{}", view.attempt.id);
    let (status, detail) = call(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["events"].as_array().map(Vec::len), Some(3));
    assert_eq!(detail["attempt"]["flagged"], true);

    let stranger = admin_token(Uuid::new_v4());
    let (status, body) = call(&app, "GET", &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    let (status, _) = call(&app, "DELETE", &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = call(&app, "GET", "/api/admin/attempts/stats", Some(&stranger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 0);

    let (status, _) = call(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/api/admin/assignments/{}", invite.assignment.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
