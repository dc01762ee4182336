use crate::database::store::{AppendedEvent, Grader, Store};
use crate::error::{Error, Result};
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
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tests: HashMap<Uuid, Test>,
    questions: HashMap<Uuid, Question>,
    assignments: HashMap<Uuid, Assignment>,
    attempts: HashMap<Uuid, Attempt>,
    answers: HashMap<(Uuid, Uuid), Answer>,
    events: Vec<Event>,
    event_totals: HashMap<(Uuid, String), i64>,
    recordings: Vec<Recording>,
}

impl Tables {
    fn remove_attempt(&mut self, attempt_id: Uuid) -> bool {
        let existed = self.attempts.remove(&attempt_id).is_some();
        self.answers.retain(|(a, _), _| *a != attempt_id);
        self.events.retain(|e| e.attempt_id != attempt_id);
        self.event_totals.retain(|(a, _), _| *a != attempt_id);
        self.recordings.retain(|r| r.attempt_id != attempt_id);
        existed
    }

    fn remove_assignment(&mut self, assignment_id: Uuid) -> bool {
        let existed = self.assignments.remove(&assignment_id).is_some();
        let attempt_ids: Vec<Uuid> = self
            .attempts
            .values()
            .filter(|a| a.assignment_id == assignment_id)
            .map(|a| a.id)
            .collect();
        for id in attempt_ids {
            self.remove_attempt(id);
        }
        existed
    }

    fn answers_of(&self, attempt_id: Uuid) -> Vec<Answer> {
        let mut rows: Vec<Answer> = self
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.updated_at);
        rows
    }

    /// Appends the event and returns the new total for its type.
    fn push_event(&mut self, event: &Event) -> i64 {
        self.events.push(event.clone());
        let total = self
            .event_totals
            .entry((event.attempt_id, event.event_type.clone()))
            .or_insert(0);
        *total += 1;
        *total
    }

    fn counted_attempts(&self, assignment_id: Uuid) -> i64 {
        self.attempts
            .values()
            .filter(|a| a.assignment_id == assignment_id && a.status.counts_against_quota())
            .count() as i64
    }
}

/// Process-local store with the same semantics as the Postgres one. Every
/// operation runs under a single lock, which makes each one atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store mutex poisoned")
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        let mut tables = self.lock();
        if let Some(existing) = tables.users.values().find(|u| u.email == user.email) {
            return Ok(existing.clone());
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn insert_test(&self, test: &Test) -> Result<Test> {
        self.lock().tests.insert(test.id, test.clone());
        Ok(test.clone())
    }

    async fn update_test(&self, test: &Test) -> Result<Test> {
        let mut tables = self.lock();
        let slot = tables
            .tests
            .get_mut(&test.id)
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        *slot = test.clone();
        Ok(test.clone())
    }

    async fn get_test(&self, id: Uuid) -> Result<Option<Test>> {
        Ok(self.lock().tests.get(&id).cloned())
    }

    async fn list_tests_by_owner(&self, owner: Uuid) -> Result<Vec<Test>> {
        let mut tests: Vec<Test> = self
            .lock()
            .tests
            .values()
            .filter(|t| t.created_by == owner)
            .cloned()
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tests)
    }

    async fn delete_test(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.lock();
        let existed = tables.tests.remove(&id).is_some();
        tables.questions.retain(|_, q| q.test_id != id);
        let assignment_ids: Vec<Uuid> = tables
            .assignments
            .values()
            .filter(|a| a.test_id == id)
            .map(|a| a.id)
            .collect();
        for assignment_id in assignment_ids {
            tables.remove_assignment(assignment_id);
        }
        Ok(existed)
    }

    async fn insert_question(&self, question: &Question) -> Result<Question> {
        let mut tables = self.lock();
        if !tables.tests.contains_key(&question.test_id) {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        tables.questions.insert(question.id, question.clone());
        Ok(question.clone())
    }

    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .lock()
            .questions
            .values()
            .filter(|q| q.test_id == test_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(questions)
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<Assignment> {
        let mut tables = self.lock();
        if tables
            .assignments
            .values()
            .any(|a| a.invite_token == assignment.invite_token)
        {
            return Err(Error::Internal("Duplicate invite token".to_string()));
        }
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment.clone())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        Ok(self.lock().assignments.get(&id).cloned())
    }

    async fn find_assignment_by_token(&self, token: &str) -> Result<Option<Assignment>> {
        Ok(self
            .lock()
            .assignments
            .values()
            .find(|a| a.invite_token == token)
            .cloned())
    }

    async fn list_assignments_for_tests(&self, test_ids: &[Uuid]) -> Result<Vec<Assignment>> {
        let mut rows: Vec<Assignment> = self
            .lock()
            .assignments
            .values()
            .filter(|a| test_ids.contains(&a.test_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_assignment(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock().remove_assignment(id))
    }

    async fn count_counted_attempts(&self, assignment_id: Uuid) -> Result<i64> {
        Ok(self.lock().counted_attempts(assignment_id))
    }

    async fn create_attempt_within_quota(
        &self,
        attempt: &Attempt,
        attempts_allowed: i32,
        opening_events: &[Event],
    ) -> Result<Option<Attempt>> {
        let mut tables = self.lock();
        if !tables.assignments.contains_key(&attempt.assignment_id) {
            return Err(Error::NotFound("Assignment not found".to_string()));
        }
        if tables.counted_attempts(attempt.assignment_id) >= i64::from(attempts_allowed) {
            return Ok(None);
        }
        tables.attempts.insert(attempt.id, attempt.clone());
        for event in opening_events {
            tables.push_event(event);
        }
        Ok(Some(attempt.clone()))
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>> {
        Ok(self.lock().attempts.get(&id).cloned())
    }

    async fn list_attempts_for_assignments(&self, assignment_ids: &[Uuid]) -> Result<Vec<Attempt>> {
        let mut rows: Vec<Attempt> = self
            .lock()
            .attempts
            .values()
            .filter(|a| assignment_ids.contains(&a.assignment_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn finalize_attempt(
        &self,
        id: Uuid,
        status: AttemptStatus,
        finished_at: DateTime<Utc>,
        grade: Grader<'_>,
    ) -> Result<Option<Attempt>> {
        let mut tables = self.lock();
        let in_progress = matches!(
            tables.attempts.get(&id),
            Some(attempt) if attempt.status == AttemptStatus::InProgress
        );
        if !in_progress {
            return Ok(None);
        }

        let score = grade(&tables.answers_of(id));
        match tables.attempts.get_mut(&id) {
            Some(attempt) => {
                attempt.status = status;
                attempt.score = score;
                attempt.finished_at = Some(finished_at);
                Ok(Some(attempt.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_flagged(&self, id: Uuid) -> Result<()> {
        if let Some(attempt) = self.lock().attempts.get_mut(&id) {
            attempt.flagged = true;
        }
        Ok(())
    }

    async fn delete_attempt(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock().remove_attempt(id))
    }

    async fn list_overdue_attempts(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let tables = self.lock();
        let mut overdue: Vec<&Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.status == AttemptStatus::InProgress)
            .filter(|a| {
                tables
                    .assignments
                    .get(&a.assignment_id)
                    .and_then(|s| tables.tests.get(&s.test_id))
                    .map(|t| a.deadline(t.duration()) <= now)
                    .unwrap_or(false)
            })
            .collect();
        overdue.sort_by_key(|a| a.started_at);
        Ok(overdue.into_iter().map(|a| a.id).collect())
    }

    async fn upsert_answer(&self, answer: &Answer) -> Result<Option<Answer>> {
        let mut tables = self.lock();
        let in_progress = tables
            .attempts
            .get(&answer.attempt_id)
            .map(|a| a.status == AttemptStatus::InProgress)
            .unwrap_or(false);
        if !in_progress {
            return Ok(None);
        }

        let key = (answer.attempt_id, answer.question_id);
        let stored = match tables.answers.get(&key) {
            Some(existing) => Answer {
                id: existing.id,
                ..answer.clone()
            },
            None => answer.clone(),
        };
        tables.answers.insert(key, stored.clone());
        Ok(Some(stored))
    }

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        Ok(self.lock().answers_of(attempt_id))
    }

    async fn count_answers(&self, attempt_id: Uuid) -> Result<i64> {
        Ok(self
            .lock()
            .answers
            .keys()
            .filter(|(a, _)| *a == attempt_id)
            .count() as i64)
    }

    async fn append_event(&self, event: &Event) -> Result<AppendedEvent> {
        let mut tables = self.lock();
        if !tables.attempts.contains_key(&event.attempt_id) {
            return Err(Error::NotFound("Attempt not found".to_string()));
        }
        let type_total = tables.push_event(event);
        Ok(AppendedEvent {
            event: event.clone(),
            type_total,
        })
    }

    async fn list_events(&self, attempt_id: Uuid) -> Result<Vec<Event>> {
        let mut rows: Vec<Event> = self
            .lock()
            .events
            .iter()
            .filter(|e| e.attempt_id == attempt_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }

    async fn count_events(&self, attempt_id: Uuid) -> Result<i64> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|e| e.attempt_id == attempt_id)
            .count() as i64)
    }

    async fn insert_recording(&self, recording: &Recording) -> Result<Recording> {
        let mut tables = self.lock();
        if !tables.attempts.contains_key(&recording.attempt_id) {
            return Err(Error::NotFound("Attempt not found".to_string()));
        }
        tables.recordings.push(recording.clone());
        Ok(recording.clone())
    }

    async fn list_recordings(&self, attempt_id: Uuid) -> Result<Vec<Recording>> {
        Ok(self
            .lock()
            .recordings
            .iter()
            .filter(|r| r.attempt_id == attempt_id)
            .cloned()
            .collect())
    }
}
