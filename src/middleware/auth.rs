use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::AdminContext;
use crate::AppState;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

/// Decodes the bearer token, requires the admin role and hands the caller's
/// id to handlers as an `AdminContext` extension.
pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match authorize(&state.config.jwt_secret, &req) {
        Ok(admin) => {
            req.extensions_mut().insert(admin);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

fn authorize(secret: &str, req: &Request) -> Result<AdminContext> {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Err(Error::Unauthorized("missing_authorization".to_string()));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(Error::Unauthorized("bad_authorization".to_string()));
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(Error::Unauthorized("unsupported_scheme".to_string()));
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let claims = decode::<Claims>(
        token.trim(),
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| Error::Unauthorized("invalid_token".to_string()))?
    .claims;

    let role = claims.role.unwrap_or_default();
    if !role.eq_ignore_ascii_case(ADMIN_ROLE) {
        return Err(Error::Forbidden("Admin role required".to_string()));
    }
    let admin_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| Error::Unauthorized("invalid_subject".to_string()))?;
    Ok(AdminContext::new(admin_id))
}

/// Signs an admin token, as issued by the login service in front of this API.
pub fn issue_admin_token(secret: &str, admin_id: Uuid, ttl: Duration) -> Result<String> {
    let claims = Claims {
        sub: admin_id.to_string(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        role: Some(ADMIN_ROLE.to_string()),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("failed to sign token: {}", e)))
}
