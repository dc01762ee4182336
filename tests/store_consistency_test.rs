mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{harness, test_config, Harness, TestOptions};
use proctor_backend::{
    database::{AppendedEvent, Grader, MemoryStore, Store},
    error::{Error, Result},
    models::{
        answer::Answer,
        assignment::Assignment,
        attempt::{Attempt, AttemptStatus, SubmitTrigger},
        event::{Event, CONSENT_ACCEPTED},
        question::{Question, QuestionType},
        recording::Recording,
        test::Test,
        user::User,
    },
    utils::time::Clock,
    AppState,
};
use serde_json::json;
use tokio_test::assert_ok;
use uuid::Uuid;

/// Delegates to a `MemoryStore` and interferes with selected calls.
struct InterferingStore {
    inner: Arc<MemoryStore>,
    /// Written through `upsert_answer` right before the close step runs.
    answer_during_close: Mutex<Option<Answer>>,
    unreadable_attempt: Mutex<Option<Uuid>>,
    reject_events: bool,
}

impl InterferingStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            answer_during_close: Mutex::new(None),
            unreadable_attempt: Mutex::new(None),
            reject_events: false,
        }
    }
}

#[async_trait]
impl Store for InterferingStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.find_user_by_email(email).await
    }
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn insert_user(&self, user: &User) -> Result<User> {
        self.inner.insert_user(user).await
    }
    async fn insert_test(&self, test: &Test) -> Result<Test> {
        self.inner.insert_test(test).await
    }
    async fn update_test(&self, test: &Test) -> Result<Test> {
        self.inner.update_test(test).await
    }
    async fn get_test(&self, id: Uuid) -> Result<Option<Test>> {
        self.inner.get_test(id).await
    }
    async fn list_tests_by_owner(&self, owner: Uuid) -> Result<Vec<Test>> {
        self.inner.list_tests_by_owner(owner).await
    }
    async fn delete_test(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_test(id).await
    }
    async fn insert_question(&self, question: &Question) -> Result<Question> {
        self.inner.insert_question(question).await
    }
    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        self.inner.list_questions(test_id).await
    }
    async fn insert_assignment(&self, assignment: &Assignment) -> Result<Assignment> {
        self.inner.insert_assignment(assignment).await
    }
    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        self.inner.get_assignment(id).await
    }
    async fn find_assignment_by_token(&self, token: &str) -> Result<Option<Assignment>> {
        self.inner.find_assignment_by_token(token).await
    }
    async fn list_assignments_for_tests(&self, test_ids: &[Uuid]) -> Result<Vec<Assignment>> {
        self.inner.list_assignments_for_tests(test_ids).await
    }
    async fn delete_assignment(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_assignment(id).await
    }
    async fn count_counted_attempts(&self, assignment_id: Uuid) -> Result<i64> {
        self.inner.count_counted_attempts(assignment_id).await
    }
    async fn create_attempt_within_quota(
        &self,
        attempt: &Attempt,
        attempts_allowed: i32,
        opening_events: &[Event],
    ) -> Result<Option<Attempt>> {
        self.inner
            .create_attempt_within_quota(attempt, attempts_allowed, opening_events)
            .await
    }
    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>> {
        if *self.unreadable_attempt.lock().unwrap() == Some(id) {
            return Err(Error::Internal("attempt row unreadable".into()));
        }
        self.inner.get_attempt(id).await
    }
    async fn list_attempts_for_assignments(&self, assignment_ids: &[Uuid]) -> Result<Vec<Attempt>> {
        self.inner.list_attempts_for_assignments(assignment_ids).await
    }
    async fn finalize_attempt(
        &self,
        id: Uuid,
        status: AttemptStatus,
        finished_at: DateTime<Utc>,
        grade: Grader<'_>,
    ) -> Result<Option<Attempt>> {
        let late = self.answer_during_close.lock().unwrap().take();
        if let Some(answer) = late {
            self.inner.upsert_answer(&answer).await?;
        }
        self.inner.finalize_attempt(id, status, finished_at, grade).await
    }
    async fn mark_flagged(&self, id: Uuid) -> Result<()> {
        self.inner.mark_flagged(id).await
    }
    async fn delete_attempt(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_attempt(id).await
    }
    async fn list_overdue_attempts(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        self.inner.list_overdue_attempts(now).await
    }
    async fn upsert_answer(&self, answer: &Answer) -> Result<Option<Answer>> {
        self.inner.upsert_answer(answer).await
    }
    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        self.inner.list_answers(attempt_id).await
    }
    async fn count_answers(&self, attempt_id: Uuid) -> Result<i64> {
        self.inner.count_answers(attempt_id).await
    }
    async fn append_event(&self, event: &Event) -> Result<AppendedEvent> {
        if self.reject_events {
            return Err(Error::Internal("event log unavailable".into()));
        }
        self.inner.append_event(event).await
    }
    async fn list_events(&self, attempt_id: Uuid) -> Result<Vec<Event>> {
        self.inner.list_events(attempt_id).await
    }
    async fn count_events(&self, attempt_id: Uuid) -> Result<i64> {
        self.inner.count_events(attempt_id).await
    }
    async fn insert_recording(&self, recording: &Recording) -> Result<Recording> {
        self.inner.insert_recording(recording).await
    }
    async fn list_recordings(&self, attempt_id: Uuid) -> Result<Vec<Recording>> {
        self.inner.list_recordings(attempt_id).await
    }
}

fn state_over(h: &Harness, store: Arc<InterferingStore>) -> AppState {
    AppState::with_parts(store, h.clock.clone(), Arc::new(test_config()), h.mailer.clone())
}

#[tokio::test]
async fn score_reflects_answer_written_while_closing() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let q = h
        .add_question(test.id, QuestionType::Single, 2, Some(vec!["X", "Y"]), json!("Y"))
        .await;
    let invite = h.invite(test.id, None, 1, None).await;

    let store = Arc::new(InterferingStore::new(h.store.clone()));
    let state = state_over(&h, store.clone());
    let view = assert_ok!(state.attempt_service.start(invite.assignment.id, h.metadata(), false).await);
    let attempt_id = view.attempt.id;

    assert_ok!(
        h.store
            .upsert_answer(&Answer {
                id: Uuid::new_v4(),
                attempt_id,
                question_id: q.id,
                answer_data: json!("X"),
                time_taken_ms: 900,
                updated_at: h.clock.now(),
            })
            .await
    );
    *store.answer_during_close.lock().unwrap() = Some(Answer {
        id: Uuid::new_v4(),
        attempt_id,
        question_id: q.id,
        answer_data: json!("Y"),
        time_taken_ms: 1500,
        updated_at: h.clock.now() + Duration::seconds(1),
    });

    let finished = assert_ok!(state.attempt_service.submit(attempt_id, SubmitTrigger::Manual).await);
    assert_eq!(finished.status, AttemptStatus::Submitted);

    let stored = h.store.list_answers(attempt_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].answer_data, json!("Y"));
    assert_eq!(finished.score, Some(100.0));

    let detail = assert_ok!(state.attempt_service.get_attempt(&h.admin, attempt_id).await);
    assert_eq!(detail.attempt.score, Some(100.0));

    let late = h
        .store
        .upsert_answer(&Answer {
            id: Uuid::new_v4(),
            attempt_id,
            question_id: q.id,
            answer_data: json!("X"),
            time_taken_ms: 100,
            updated_at: h.clock.now() + Duration::seconds(2),
        })
        .await
        .unwrap();
    assert!(late.is_none());
}

#[tokio::test]
async fn sweep_keeps_going_past_an_unreadable_attempt() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let first = h.invite(test.id, None, 1, None).await;
    let second = h.invite(test.id, None, 1, None).await;

    let store = Arc::new(InterferingStore::new(h.store.clone()));
    let state = state_over(&h, store.clone());
    let broken = assert_ok!(state.attempt_service.start(first.assignment.id, h.metadata(), false).await);
    h.clock.advance(Duration::seconds(5));
    let healthy = assert_ok!(state.attempt_service.start(second.assignment.id, h.metadata(), false).await);

    h.clock.advance(Duration::seconds(700));
    *store.unreadable_attempt.lock().unwrap() = Some(broken.attempt.id);

    let closed = assert_ok!(state.attempt_service.sweep_overdue().await);
    assert_eq!(closed, 1);

    let healthy = h.store.get_attempt(healthy.attempt.id).await.unwrap().unwrap();
    assert_eq!(healthy.status, AttemptStatus::AutoSubmitted);
    let broken_row = h.store.get_attempt(broken.attempt.id).await.unwrap().unwrap();
    assert_eq!(broken_row.status, AttemptStatus::InProgress);

    *store.unreadable_attempt.lock().unwrap() = None;
    let closed = assert_ok!(state.attempt_service.sweep_overdue().await);
    assert_eq!(closed, 1);
}

#[tokio::test]
async fn consent_is_stored_with_the_attempt() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let invite = h.invite(test.id, None, 1, None).await;

    let mut interfering = InterferingStore::new(h.store.clone());
    interfering.reject_events = true;
    let state = state_over(&h, Arc::new(interfering));

    let view = assert_ok!(state.attempt_service.start(invite.assignment.id, h.metadata(), true).await);
    assert_eq!(view.attempt.status, AttemptStatus::InProgress);

    let events = h.store.list_events(view.attempt.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, CONSENT_ACCEPTED);
    assert_eq!(events[0].created_at, view.attempt.started_at);
}

#[tokio::test]
async fn no_consent_means_no_opening_event() {
    let h = harness();
    let test = h.create_test(TestOptions::default()).await;
    let invite = h.invite(test.id, None, 1, None).await;

    let view = assert_ok!(h.state.attempt_service.start(invite.assignment.id, h.metadata(), false).await);
    assert_eq!(h.store.count_events(view.attempt.id).await.unwrap(), 0);
}
