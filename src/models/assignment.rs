use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub test_id: Uuid,
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub invite_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub attempts_allowed: i32,
    pub link_mode: LinkMode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "link_mode", rename_all = "snake_case")]
pub enum LinkMode {
    #[default]
    SingleUse,
    Bulk,
}

impl Assignment {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }
}
