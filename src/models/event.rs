use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

pub const TAB_SWITCH: &str = "tab_switch";
pub const TAB_RETURN: &str = "tab_return";
pub const FULLSCREEN_EXIT: &str = "fullscreen_exit";
pub const BLOCKED_SHORTCUT: &str = "blocked_shortcut";
pub const CAMERA_OFF: &str = "camera_off";
pub const CONSENT_ACCEPTED: &str = "consent_accepted";
pub const RECORDING_SAVED: &str = "recording_saved";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub event_type: String,
    pub event_data: JsonValue,
    pub created_at: DateTime<Utc>,
}
