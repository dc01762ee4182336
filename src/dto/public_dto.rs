use crate::models::{
    answer::Answer,
    assignment::LinkMode,
    attempt::{Attempt, DisplayStatus, SubmitTrigger},
    event::Event,
    question::{Question, QuestionType},
    test::{ProctoringPolicy, Test},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTestSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration_seconds: i32,
    #[serde(flatten)]
    pub policy: ProctoringPolicy,
    pub question_count: usize,
}

impl PublicTestSummary {
    pub fn new(test: &Test, question_count: usize) -> Self {
        Self {
            id: test.id,
            title: test.title.clone(),
            description: test.description.clone(),
            duration_seconds: test.duration_seconds,
            policy: test.policy,
            question_count,
        }
    }
}

/// Question as shown to a candidate: never carries the answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateQuestion {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub image_url: Option<String>,
    pub marks: i32,
    pub position: i32,
    pub choices: Vec<String>,
}

impl From<&Question> for CandidateQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type,
            prompt: q.prompt.clone(),
            image_url: q.image_url.clone(),
            marks: q.marks,
            position: q.position,
            choices: q.choice_list(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteView {
    pub assignment_id: Uuid,
    pub test: PublicTestSummary,
    pub status: DisplayStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub link_mode: LinkMode,
    pub attempts_allowed: i32,
    pub attempts_used: i64,
    pub guest: bool,
    pub candidate_email_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyInviteRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyInviteResponse {
    pub verified: bool,
    pub invite: InviteView,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartAttemptRequest {
    #[serde(default)]
    pub consent_accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptView {
    pub attempt: Attempt,
    pub test: PublicTestSummary,
    pub questions: Vec<CandidateQuestion>,
    pub answers: Vec<Answer>,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub question_id: Uuid,
    #[serde(default)]
    pub answer_data: JsonValue,
    #[validate(range(min = 0))]
    pub time_taken_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordEventRequest {
    #[validate(length(min = 1, max = 64))]
    pub event_type: String,
    #[serde(default)]
    pub event_data: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventResponse {
    pub event: Event,
    pub flagged: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitAttemptRequest {
    #[serde(default)]
    pub trigger: SubmitTrigger,
}
