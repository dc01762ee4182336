use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::public_dto::{
    RecordEventRequest, SaveAnswerRequest, StartAttemptRequest, SubmitAttemptRequest,
    VerifyInviteRequest, VerifyInviteResponse,
};
use crate::error::{Error, Result};
use crate::services::recording_service::RecordingUpload;
use crate::utils::client::client_metadata;
use crate::AppState;

const UPLOAD_FIELDS: [&str; 2] = ["frame", "recording"];

#[utoipa::path(
    get,
    path = "/api/public/invites/{token}",
    params(("token" = String, Path, description = "Invite token")),
    responses(
        (status = 200, description = "Invite is redeemable", body = InviteView),
        (status = 404, description = "Unknown token"),
        (status = 409, description = "No attempts left"),
        (status = 410, description = "Invite expired")
    )
)]
#[axum::debug_handler]
pub async fn redeem_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let invite = state.invite_service.redeem(&token).await?;
    Ok(Json(invite))
}

#[utoipa::path(
    post,
    path = "/api/public/invites/{token}/verify",
    params(("token" = String, Path, description = "Invite token")),
    request_body = VerifyInviteRequest,
    responses(
        (status = 200, description = "Identity accepted", body = VerifyInviteResponse),
        (status = 403, description = "Email does not match the invited candidate")
    )
)]
#[axum::debug_handler]
pub async fn verify_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<VerifyInviteRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let invite = state.invite_service.verify(&token, &payload.email).await?;
    Ok(Json(VerifyInviteResponse {
        verified: true,
        invite,
    }))
}

#[utoipa::path(
    post,
    path = "/api/public/assignments/{assignment_id}/start",
    params(("assignment_id" = Uuid, Path, description = "Assignment ID")),
    request_body = StartAttemptRequest,
    responses(
        (status = 201, description = "Attempt started", body = AttemptView),
        (status = 409, description = "No attempts left"),
        (status = 410, description = "Invite expired")
    )
)]
pub async fn start_attempt(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Option<Json<StartAttemptRequest>>,
) -> Result<impl IntoResponse> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let metadata = client_metadata(&headers, state.clock.now());
    let view = state
        .attempt_service
        .start(assignment_id, metadata, payload.consent_accepted)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    get,
    path = "/api/public/attempts/{attempt_id}",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    responses(
        (status = 200, description = "Attempt with questions and remaining time", body = AttemptView),
        (status = 404, description = "Attempt not found")
    )
)]
#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state.attempt_service.view(attempt_id).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/api/public/attempts/{attempt_id}/answer",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    request_body = SaveAnswerRequest,
    responses(
        (status = 200, description = "Answer stored"),
        (status = 404, description = "Attempt or question not found"),
        (status = 409, description = "Attempt no longer accepts answers")
    )
)]
#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let answer = state.attempt_service.save_answer(attempt_id, payload).await?;
    Ok(Json(json!({ "saved": true, "answer": answer })))
}

#[utoipa::path(
    post,
    path = "/api/public/attempts/{attempt_id}/events",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    request_body = RecordEventRequest,
    responses(
        (status = 201, description = "Event recorded", body = RecordEventResponse),
        (status = 404, description = "Attempt not found")
    )
)]
#[axum::debug_handler]
pub async fn record_event(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<RecordEventRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let recorded = state
        .integrity_service
        .record(attempt_id, &payload.event_type, payload.event_data)
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

#[utoipa::path(
    post,
    path = "/api/public/attempts/{attempt_id}/recording",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    responses(
        (status = 201, description = "Recording stored", body = Recording),
        (status = 400, description = "Missing file, wrong type or too large"),
        (status = 404, description = "Attempt not found")
    )
)]
pub async fn upload_recording(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if !UPLOAD_FIELDS.contains(&field.name().unwrap_or_default()) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some(RecordingUpload {
            file_name,
            content_type,
            bytes,
        });
        break;
    }
    let upload = upload.ok_or_else(|| Error::BadRequest("No file provided".to_string()))?;

    let recording = state.recording_service.save(attempt_id, upload).await?;
    Ok((StatusCode::CREATED, Json(recording)))
}

#[utoipa::path(
    post,
    path = "/api/public/attempts/{attempt_id}/submit",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    request_body = SubmitAttemptRequest,
    responses(
        (status = 200, description = "Attempt graded and closed", body = Attempt),
        (status = 409, description = "Attempt already submitted")
    )
)]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    payload: Option<Json<SubmitAttemptRequest>>,
) -> Result<impl IntoResponse> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let attempt = state
        .attempt_service
        .submit(attempt_id, payload.trigger)
        .await?;
    Ok(Json(attempt))
}
