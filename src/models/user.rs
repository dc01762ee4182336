use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Candidate identity an invite can be bound to. Accounts created from an
/// invite email are placeholders with the email prefix as name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Authenticated admin on whose behalf an admin operation runs. Every test,
/// assignment and attempt lookup is scoped to tests this admin created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminContext {
    pub admin_id: Uuid,
}

impl AdminContext {
    pub fn new(admin_id: Uuid) -> Self {
        Self { admin_id }
    }
}
