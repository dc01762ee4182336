use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::admin_dto::{
    AssignmentListQuery, AttemptListQuery, CreateInviteRequest, CreateQuestionRequest,
    CreateTestRequest, UpdateTestRequest,
};
use crate::error::Result;
use crate::models::user::AdminContext;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/admin/tests",
    responses((status = 200, description = "Tests created by the caller", body = [TestSummary]))
)]
#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
) -> Result<impl IntoResponse> {
    let tests = state.test_service.list_tests(&admin).await?;
    Ok(Json(tests))
}

#[utoipa::path(
    post,
    path = "/api/admin/tests",
    request_body = CreateTestRequest,
    responses(
        (status = 201, description = "Test created", body = Test),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state.test_service.create_test(&admin, payload).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

#[utoipa::path(
    get,
    path = "/api/admin/tests/{id}",
    params(("id" = Uuid, Path, description = "Test ID")),
    responses(
        (status = 200, description = "Test with its questions", body = TestDetail),
        (status = 404, description = "Test not found")
    )
)]
pub async fn get_test(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.get_test(&admin, id).await?;
    Ok(Json(test))
}

#[utoipa::path(
    put,
    path = "/api/admin/tests/{id}",
    params(("id" = Uuid, Path, description = "Test ID")),
    request_body = UpdateTestRequest,
    responses(
        (status = 200, description = "Test updated", body = Test),
        (status = 404, description = "Test not found")
    )
)]
pub async fn update_test(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state.test_service.update_test(&admin, id, payload).await?;
    Ok(Json(test))
}

#[utoipa::path(
    delete,
    path = "/api/admin/tests/{id}",
    params(("id" = Uuid, Path, description = "Test ID")),
    responses(
        (status = 204, description = "Test and everything under it deleted"),
        (status = 404, description = "Test not found")
    )
)]
pub async fn delete_test(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.test_service.delete_test(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/admin/tests/{id}/questions",
    params(("id" = Uuid, Path, description = "Test ID")),
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Question added", body = Question),
        (status = 400, description = "Invalid question or answer key"),
        (status = 404, description = "Test not found")
    )
)]
pub async fn add_question(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state.test_service.add_question(&admin, id, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

#[utoipa::path(
    post,
    path = "/api/admin/invites",
    request_body = CreateInviteRequest,
    responses(
        (status = 201, description = "Invite created", body = InviteCreated),
        (status = 404, description = "Test or candidate not found")
    )
)]
#[axum::debug_handler]
pub async fn create_invite(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Json(payload): Json<CreateInviteRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let created = state.invite_service.create_invite(&admin, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/admin/assignments",
    params(("test_id" = Option<Uuid>, Query, description = "Only assignments of this test")),
    responses((status = 200, description = "Assignments with derived status", body = [AssignmentSummary]))
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Query(query): Query<AssignmentListQuery>,
) -> Result<impl IntoResponse> {
    let assignments = state
        .invite_service
        .list_assignments(&admin, query.test_id)
        .await?;
    Ok(Json(assignments))
}

#[utoipa::path(
    delete,
    path = "/api/admin/assignments/{id}",
    params(("id" = Uuid, Path, description = "Assignment ID")),
    responses(
        (status = 204, description = "Assignment and its attempts deleted"),
        (status = 403, description = "Assignment belongs to another admin"),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn delete_assignment(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.invite_service.delete_assignment(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/admin/attempts",
    params(
        ("test_id" = Option<Uuid>, Query, description = "Filter by test"),
        ("flagged" = Option<bool>, Query, description = "Filter by flag"),
        ("status" = Option<String>, Query, description = "Filter by status")
    ),
    responses((status = 200, description = "Attempts, newest first", body = [AttemptListItem]))
)]
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Query(query): Query<AttemptListQuery>,
) -> Result<impl IntoResponse> {
    let attempts = state.attempt_service.list_attempts(&admin, query).await?;
    Ok(Json(attempts))
}

#[utoipa::path(
    get,
    path = "/api/admin/attempts/stats",
    responses((status = 200, description = "Attempt counters", body = AttemptStats))
)]
pub async fn attempt_stats(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
) -> Result<impl IntoResponse> {
    let stats = state.attempt_service.stats(&admin).await?;
    Ok(Json(stats))
}

#[utoipa::path(
    get,
    path = "/api/admin/attempts/{id}",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    responses(
        (status = 200, description = "Attempt with answers, events and recordings", body = AttemptDetail),
        (status = 403, description = "Attempt belongs to another admin"),
        (status = 404, description = "Attempt not found")
    )
)]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let detail = state.attempt_service.get_attempt(&admin, id).await?;
    Ok(Json(detail))
}

#[utoipa::path(
    delete,
    path = "/api/admin/attempts/{id}",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    responses(
        (status = 204, description = "Attempt deleted"),
        (status = 403, description = "Attempt belongs to another admin"),
        (status = 404, description = "Attempt not found")
    )
)]
pub async fn delete_attempt(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.attempt_service.delete_attempt(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
