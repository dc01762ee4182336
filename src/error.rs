use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invite expired: {0}")]
    Expired(String),

    #[error("Attempt quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Email does not match the assigned candidate email")]
    IdentityMismatch { assigned_email_hint: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

impl Error {
    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration_error",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) | Error::Multipart(_) => {
                "bad_request"
            }
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Expired(_) => "invite_expired",
            Error::QuotaExceeded(_) => "max_attempts_reached",
            Error::IdentityMismatch { .. } => "identity_mismatch",
            Error::InvalidState(_) => "invalid_state",
            Error::Database(_) | Error::Migrate(_) => "storage_failure",
            Error::Reqwest(_) => "external_service_error",
            Error::Anyhow(_) | Error::Internal(_) | Error::Io(_) => "internal_error",
        }
    }
}

fn diagnostics_enabled() -> bool {
    crate::config::CONFIG
        .get()
        .map(|c| c.expose_error_details())
        .unwrap_or(false)
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();
        let generic = |detail: String| {
            if diagnostics_enabled() {
                format!("Internal server error: {}", detail)
            } else {
                "Internal server error".to_string()
            }
        };

        let (status, message) = match &self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Expired(msg) => (StatusCode::GONE, msg.clone()),
            Error::QuotaExceeded(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::IdentityMismatch { assigned_email_hint } => {
                let body = Json(json!({
                    "error": code,
                    "message": self.to_string(),
                    "assigned_email": assigned_email_hint,
                }));
                return (StatusCode::FORBIDDEN, body).into_response();
            }
            Error::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Multipart(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Reqwest(err) => (
                StatusCode::BAD_GATEWAY,
                format!("External service error: {}", err),
            ),
            Error::Database(err) => {
                tracing::error!(error = %err, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, generic(err.to_string()))
            }
            other => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, generic(other.to_string()))
            }
        };

        let body = Json(json!({ "error": code, "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
