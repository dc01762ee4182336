use crate::models::{
    answer::Answer,
    assignment::{Assignment, LinkMode},
    attempt::{Attempt, AttemptStatus, DisplayStatus},
    event::Event,
    question::{Question, QuestionType},
    recording::Recording,
    test::Test,
    user::User,
};
use crate::services::grading_service::ScoreReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

fn default_auto_flag_threshold() -> i32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub duration_seconds: i32,
    #[serde(default)]
    pub camera_required: bool,
    #[serde(default)]
    pub record_video: bool,
    #[serde(default)]
    pub block_tab_switch: bool,
    #[serde(default)]
    pub require_fullscreen: bool,
    #[serde(default)]
    pub disable_copy_paste: bool,
    #[serde(default = "default_auto_flag_threshold")]
    #[validate(range(min = 0))]
    pub auto_flag_threshold: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTestRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub duration_seconds: Option<i32>,
    pub camera_required: Option<bool>,
    pub record_video: Option<bool>,
    pub block_tab_switch: Option<bool>,
    pub require_fullscreen: Option<bool>,
    pub disable_copy_paste: Option<bool>,
    #[validate(range(min = 0))]
    pub auto_flag_threshold: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1))]
    pub prompt: String,
    pub image_url: Option<String>,
    #[validate(range(min = 1))]
    pub marks: Option<i32>,
    #[validate(range(min = 0))]
    pub order: Option<i32>,
    pub choices: Option<Vec<String>>,
    pub correct_answer: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    #[serde(flatten)]
    pub test: Test,
    pub question_count: usize,
    pub assignment_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDetail {
    #[serde(flatten)]
    pub test: Test,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInviteRequest {
    pub test_id: Uuid,
    pub user_id: Option<Uuid>,
    #[validate(email)]
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub attempts_allowed: Option<i32>,
    pub link_mode: Option<LinkMode>,
    #[serde(default)]
    pub send_email: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteCreated {
    pub assignment: Assignment,
    pub invite_token: String,
    pub redemption_link: String,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentListQuery {
    pub test_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateInfo {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl From<User> for CandidateInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub id: Uuid,
    pub status: AttemptStatus,
    pub score: Option<f64>,
    pub flagged: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub event_count: i64,
    pub answer_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSummary {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub test_title: String,
    pub redemption_link: String,
    pub candidate: Option<CandidateInfo>,
    pub status: DisplayStatus,
    pub attempts_used: usize,
    pub latest_attempt: Option<AttemptSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptListQuery {
    pub test_id: Option<Uuid>,
    pub flagged: Option<bool>,
    pub status: Option<AttemptStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptListItem {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub test_id: Uuid,
    pub test_title: String,
    pub candidate: Option<CandidateInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetail {
    pub attempt: Attempt,
    pub assignment: Assignment,
    pub test: Test,
    pub candidate: Option<CandidateInfo>,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub events: Vec<Event>,
    pub recordings: Vec<Recording>,
    pub grading: ScoreReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStats {
    pub total: usize,
    pub flagged: usize,
    pub in_progress: usize,
    pub submitted: usize,
    pub auto_submitted: usize,
}
