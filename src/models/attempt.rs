use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub candidate_id: Option<Uuid>,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub flagged: bool,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Persisted attempt states. `Expired` exists for rows written by older
/// deployments; new attempts only ever move `InProgress -> Submitted | AutoSubmitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    AutoSubmitted,
    Expired,
}

impl AttemptStatus {
    pub const COUNTED: [AttemptStatus; 3] = [
        AttemptStatus::InProgress,
        AttemptStatus::Submitted,
        AttemptStatus::AutoSubmitted,
    ];

    /// Statuses that consume one of the assignment's allowed attempts.
    pub fn counts_against_quota(self) -> bool {
        Self::COUNTED.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::AutoSubmitted => "auto_submitted",
            AttemptStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    #[default]
    Manual,
    Timeout,
}

impl SubmitTrigger {
    pub fn terminal_status(self) -> AttemptStatus {
        match self {
            SubmitTrigger::Manual => AttemptStatus::Submitted,
            SubmitTrigger::Timeout => AttemptStatus::AutoSubmitted,
        }
    }
}

/// Status shown for an assignment, including the states that are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Pending,
    Expired,
    InProgress,
    Submitted,
    AutoSubmitted,
}

impl From<AttemptStatus> for DisplayStatus {
    fn from(status: AttemptStatus) -> Self {
        match status {
            AttemptStatus::InProgress => DisplayStatus::InProgress,
            AttemptStatus::Submitted => DisplayStatus::Submitted,
            AttemptStatus::AutoSubmitted => DisplayStatus::AutoSubmitted,
            AttemptStatus::Expired => DisplayStatus::Expired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

impl Attempt {
    pub fn deadline(&self, duration: Duration) -> DateTime<Utc> {
        self.started_at + duration
    }
}
