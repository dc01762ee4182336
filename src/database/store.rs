use crate::error::Result;
use crate::models::{
    answer::Answer,
    assignment::Assignment,
    attempt::{Attempt, AttemptStatus},
    event::Event,
    question::Question,
    recording::Recording,
    test::Test,
    user::User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Event row plus the running total of events of the same type for the attempt,
/// both produced by the same write.
#[derive(Debug, Clone)]
pub struct AppendedEvent {
    pub event: Event,
    pub type_total: i64,
}

/// Scores an attempt from its answers as they stand when it closes.
pub type Grader<'a> = &'a (dyn Fn(&[Answer]) -> Option<f64> + Send + Sync);

/// Persistence contract the services depend on. Deleting a test or an
/// assignment removes every attempt, answer, event and recording under it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> Result<User>;

    async fn insert_test(&self, test: &Test) -> Result<Test>;
    async fn update_test(&self, test: &Test) -> Result<Test>;
    async fn get_test(&self, id: Uuid) -> Result<Option<Test>>;
    async fn list_tests_by_owner(&self, owner: Uuid) -> Result<Vec<Test>>;
    async fn delete_test(&self, id: Uuid) -> Result<bool>;

    async fn insert_question(&self, question: &Question) -> Result<Question>;
    /// Questions of a test ordered by position.
    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>>;

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<Assignment>;
    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>>;
    async fn find_assignment_by_token(&self, token: &str) -> Result<Option<Assignment>>;
    /// Newest first.
    async fn list_assignments_for_tests(&self, test_ids: &[Uuid]) -> Result<Vec<Assignment>>;
    async fn delete_assignment(&self, id: Uuid) -> Result<bool>;

    /// Attempts of the assignment whose status consumes quota.
    async fn count_counted_attempts(&self, assignment_id: Uuid) -> Result<i64>;
    /// Inserts `attempt`, followed by `opening_events`, only if fewer than
    /// `attempts_allowed` counted attempts exist for its assignment. The count
    /// and all inserts are one atomic step.
    async fn create_attempt_within_quota(
        &self,
        attempt: &Attempt,
        attempts_allowed: i32,
        opening_events: &[Event],
    ) -> Result<Option<Attempt>>;
    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>>;
    /// Newest first.
    async fn list_attempts_for_assignments(&self, assignment_ids: &[Uuid]) -> Result<Vec<Attempt>>;
    /// Compare-and-set from `in_progress` to `status`. The stored answers are
    /// read and passed to `grade` inside the same atomic step, and the answer
    /// writes of `upsert_answer` are serialised against it. `None` when the
    /// attempt was not in progress (or does not exist); nothing is written in
    /// that case.
    async fn finalize_attempt(
        &self,
        id: Uuid,
        status: AttemptStatus,
        finished_at: DateTime<Utc>,
        grade: Grader<'_>,
    ) -> Result<Option<Attempt>>;
    /// Sets `flagged = true`; never clears it.
    async fn mark_flagged(&self, id: Uuid) -> Result<()>;
    async fn delete_attempt(&self, id: Uuid) -> Result<bool>;
    /// In-progress attempts whose `started_at + duration_seconds <= now`.
    async fn list_overdue_attempts(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>>;

    /// Last write wins per (attempt, question). `None` when the attempt is no
    /// longer in progress at write time.
    async fn upsert_answer(&self, answer: &Answer) -> Result<Option<Answer>>;
    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>>;
    async fn count_answers(&self, attempt_id: Uuid) -> Result<i64>;

    async fn append_event(&self, event: &Event) -> Result<AppendedEvent>;
    /// Oldest first.
    async fn list_events(&self, attempt_id: Uuid) -> Result<Vec<Event>>;
    async fn count_events(&self, attempt_id: Uuid) -> Result<i64>;

    async fn insert_recording(&self, recording: &Recording) -> Result<Recording>;
    async fn list_recordings(&self, attempt_id: Uuid) -> Result<Vec<Recording>>;
}
