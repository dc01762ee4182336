use crate::database::Store;
use crate::dto::admin_dto::{AttemptDetail, AttemptListItem, AttemptListQuery, AttemptStats, CandidateInfo};
use crate::dto::public_dto::{AttemptView, CandidateQuestion, PublicTestSummary, SaveAnswerRequest};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::assignment::Assignment;
use crate::models::attempt::{Attempt, AttemptStatus, ClientMetadata, SubmitTrigger};
use crate::models::event::{Event, CONSENT_ACCEPTED};
use crate::models::question::AnswerValue;
use crate::models::test::Test;
use crate::models::user::AdminContext;
use crate::services::grading_service::GradingService;
use crate::services::invite_service::InviteService;
use crate::utils::time::{seconds_until, Clock};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    invites: InviteService,
}

/// An attempt together with the assignment and test it runs under.
struct Loaded {
    attempt: Attempt,
    assignment: Assignment,
    test: Test,
}

impl Loaded {
    fn deadline(&self) -> DateTime<Utc> {
        self.attempt.deadline(self.test.duration())
    }
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, invites: InviteService) -> Self {
        Self {
            store,
            clock,
            invites,
        }
    }

    /// `(none) -> in_progress`. The quota check, the insert and the consent
    /// event are one storage step, so concurrent starts cannot exceed
    /// `attempts_allowed`.
    pub async fn start(
        &self,
        assignment_id: Uuid,
        metadata: ClientMetadata,
        consent_accepted: bool,
    ) -> Result<AttemptView> {
        let assignment = self
            .store
            .get_assignment(assignment_id)
            .await?
            .ok_or_else(|| Error::NotFound("Assignment not found".to_string()))?;
        let now = self.clock.now();
        self.invites.validate_for_redemption(&assignment, now).await?;

        let attempt = Attempt {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            candidate_id: assignment.user_id,
            status: AttemptStatus::InProgress,
            started_at: now,
            finished_at: None,
            score: None,
            flagged: false,
            metadata: serde_json::to_value(&metadata)?,
            created_at: now,
        };
        let consent = consent_accepted.then(|| Event {
            id: Uuid::new_v4(),
            attempt_id: attempt.id,
            event_type: CONSENT_ACCEPTED.to_string(),
            event_data: json!({ "timestamp": now }),
            created_at: now,
        });
        let attempt = self
            .store
            .create_attempt_within_quota(&attempt, assignment.attempts_allowed, consent.as_slice())
            .await?
            .ok_or_else(|| Error::QuotaExceeded("Maximum number of attempts reached".to_string()))?;

        tracing::info!(
            attempt_id = %attempt.id,
            assignment_id = %assignment.id,
            ip = %metadata.ip,
            "attempt started"
        );
        self.view(attempt.id).await
    }

    /// Candidate view of a running or finished attempt. An in-progress attempt
    /// found past its deadline is auto-submitted first.
    pub async fn view(&self, attempt_id: Uuid) -> Result<AttemptView> {
        let mut loaded = self.load(attempt_id).await?;
        let now = self.clock.now();
        if loaded.attempt.status == AttemptStatus::InProgress && now >= loaded.deadline() {
            loaded.attempt = match self.close_overdue(&loaded).await? {
                Some(finished) => finished,
                None => self
                    .store
                    .get_attempt(attempt_id)
                    .await?
                    .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?,
            };
        }

        let questions = self.store.list_questions(loaded.test.id).await?;
        let answers = self.store.list_answers(loaded.attempt.id).await?;
        let deadline = loaded.deadline();
        let remaining_seconds = if loaded.attempt.status == AttemptStatus::InProgress {
            seconds_until(deadline, now)
        } else {
            0
        };

        Ok(AttemptView {
            test: PublicTestSummary::new(&loaded.test, questions.len()),
            questions: questions.iter().map(CandidateQuestion::from).collect(),
            answers,
            deadline,
            remaining_seconds,
            attempt: loaded.attempt,
        })
    }

    /// Last write wins per question. Rejected once the attempt left
    /// `in_progress` or its deadline passed.
    pub async fn save_answer(&self, attempt_id: Uuid, payload: SaveAnswerRequest) -> Result<Answer> {
        let loaded = self.load(attempt_id).await?;
        if loaded.attempt.status != AttemptStatus::InProgress {
            tracing::warn!(attempt_id = %attempt_id, status = loaded.attempt.status.as_str(), "answer after submission rejected");
            return Err(Error::InvalidState(format!(
                "Attempt is {}, answers are closed",
                loaded.attempt.status.as_str()
            )));
        }

        let now = self.clock.now();
        if now > loaded.deadline() {
            tracing::warn!(attempt_id = %attempt_id, "answer after deadline rejected");
            self.close_overdue(&loaded).await?;
            return Err(Error::InvalidState("Time limit exceeded".to_string()));
        }

        let questions = self.store.list_questions(loaded.test.id).await?;
        if !questions.iter().any(|q| q.id == payload.question_id) {
            return Err(Error::NotFound("Question not found in this test".to_string()));
        }
        AnswerValue::from_json(&payload.answer_data).map_err(|e| Error::BadRequest(e.to_string()))?;

        let answer = Answer {
            id: Uuid::new_v4(),
            attempt_id,
            question_id: payload.question_id,
            answer_data: payload.answer_data,
            time_taken_ms: payload.time_taken_ms.unwrap_or(0),
            updated_at: now,
        };
        self.store
            .upsert_answer(&answer)
            .await?
            .ok_or_else(|| Error::InvalidState("Attempt is no longer in progress".to_string()))
    }

    /// The single terminal transition. A manual submit arriving after the
    /// deadline is recorded as `auto_submitted`; a timeout submit before the
    /// deadline is rejected.
    pub async fn submit(&self, attempt_id: Uuid, trigger: SubmitTrigger) -> Result<Attempt> {
        let loaded = self.load(attempt_id).await?;
        if loaded.attempt.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "Attempt already {}",
                loaded.attempt.status.as_str()
            )));
        }

        let overdue = self.clock.now() >= loaded.deadline();
        let trigger = match (trigger, overdue) {
            (SubmitTrigger::Timeout, false) => {
                return Err(Error::InvalidState(
                    "Time limit has not been reached".to_string(),
                ))
            }
            (_, true) => SubmitTrigger::Timeout,
            (SubmitTrigger::Manual, false) => SubmitTrigger::Manual,
        };
        self.finalize(&loaded, trigger).await
    }

    /// Auto-submits every in-progress attempt whose deadline has passed.
    /// Returns how many were closed by this sweep.
    pub async fn sweep_overdue(&self) -> Result<usize> {
        let overdue = self.store.list_overdue_attempts(self.clock.now()).await?;
        let mut closed = 0;
        for attempt_id in overdue {
            let result = match self.load(attempt_id).await {
                Ok(loaded) => self.close_overdue(&loaded).await,
                Err(Error::NotFound(_)) => continue,
                Err(err) => Err(err),
            };
            match result {
                Ok(Some(_)) => closed += 1,
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(attempt_id = %attempt_id, error = %err, "deadline sweep could not close attempt");
                }
            }
        }
        if closed > 0 {
            tracing::info!(closed, "deadline sweep auto-submitted attempts");
        }
        Ok(closed)
    }

    pub async fn get_attempt(&self, admin: &AdminContext, attempt_id: Uuid) -> Result<AttemptDetail> {
        let loaded = self.load(attempt_id).await?;
        self.invites.ensure_owned(admin, &loaded.assignment).await?;

        let questions = self.store.list_questions(loaded.test.id).await?;
        let answers = self.store.list_answers(loaded.attempt.id).await?;
        let events = self.store.list_events(loaded.attempt.id).await?;
        let recordings = self.store.list_recordings(loaded.attempt.id).await?;
        let candidate = self.candidate(loaded.attempt.candidate_id).await?;
        let grading = GradingService::score(&questions, &answers);

        Ok(AttemptDetail {
            attempt: loaded.attempt,
            assignment: loaded.assignment,
            test: loaded.test,
            candidate,
            questions,
            answers,
            events,
            recordings,
            grading,
        })
    }

    /// Attempts across the admin's tests, newest first.
    pub async fn list_attempts(
        &self,
        admin: &AdminContext,
        filter: AttemptListQuery,
    ) -> Result<Vec<AttemptListItem>> {
        let tests: Vec<Test> = self
            .store
            .list_tests_by_owner(admin.admin_id)
            .await?
            .into_iter()
            .filter(|t| filter.test_id.map_or(true, |id| t.id == id))
            .collect();
        let test_ids: Vec<Uuid> = tests.iter().map(|t| t.id).collect();
        let assignments = self.store.list_assignments_for_tests(&test_ids).await?;
        let assignment_ids: Vec<Uuid> = assignments.iter().map(|a| a.id).collect();
        let attempts = self
            .store
            .list_attempts_for_assignments(&assignment_ids)
            .await?;

        let mut out = Vec::new();
        for attempt in attempts {
            if filter.flagged.is_some_and(|f| attempt.flagged != f) {
                continue;
            }
            if filter.status.is_some_and(|s| attempt.status != s) {
                continue;
            }
            let Some(test) = assignments
                .iter()
                .find(|a| a.id == attempt.assignment_id)
                .and_then(|a| tests.iter().find(|t| t.id == a.test_id))
            else {
                continue;
            };
            out.push(AttemptListItem {
                test_id: test.id,
                test_title: test.title.clone(),
                candidate: self.candidate(attempt.candidate_id).await?,
                attempt,
            });
        }
        Ok(out)
    }

    pub async fn delete_attempt(&self, admin: &AdminContext, attempt_id: Uuid) -> Result<()> {
        let loaded = self.load(attempt_id).await?;
        self.invites.ensure_owned(admin, &loaded.assignment).await?;
        self.store.delete_attempt(loaded.attempt.id).await?;
        tracing::info!(attempt_id = %attempt_id, "attempt deleted");
        Ok(())
    }

    pub async fn stats(&self, admin: &AdminContext) -> Result<AttemptStats> {
        let attempts = self.list_attempts(admin, AttemptListQuery::default()).await?;
        let mut stats = AttemptStats {
            total: attempts.len(),
            ..AttemptStats::default()
        };
        for item in &attempts {
            if item.attempt.flagged {
                stats.flagged += 1;
            }
            match item.attempt.status {
                AttemptStatus::InProgress => stats.in_progress += 1,
                AttemptStatus::Submitted => stats.submitted += 1,
                AttemptStatus::AutoSubmitted => stats.auto_submitted += 1,
                AttemptStatus::Expired => {}
            }
        }
        Ok(stats)
    }

    /// Grades and closes the attempt. Losing the compare-and-set to a
    /// concurrent submit yields `InvalidState` and leaves the winner's score.
    async fn finalize(&self, loaded: &Loaded, trigger: SubmitTrigger) -> Result<Attempt> {
        let questions = self.store.list_questions(loaded.test.id).await?;
        // Runs inside the store's close step against the answers it sees there.
        let grade = |answers: &[Answer]| GradingService::score(&questions, answers).score;

        let status = trigger.terminal_status();
        let finished = self
            .store
            .finalize_attempt(loaded.attempt.id, status, self.clock.now(), &grade)
            .await?
            .ok_or_else(|| Error::InvalidState("Attempt already submitted".to_string()))?;

        tracing::info!(
            attempt_id = %finished.id,
            assignment_id = %loaded.assignment.id,
            status = status.as_str(),
            score = ?finished.score,
            "attempt finished"
        );
        Ok(finished)
    }

    /// Timeout submit that tolerates losing the race to another submit.
    /// `None` when someone else closed the attempt first.
    async fn close_overdue(&self, loaded: &Loaded) -> Result<Option<Attempt>> {
        match self.finalize(loaded, SubmitTrigger::Timeout).await {
            Ok(attempt) => Ok(Some(attempt)),
            Err(Error::InvalidState(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn load(&self, attempt_id: Uuid) -> Result<Loaded> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;
        let assignment = self
            .store
            .get_assignment(attempt.assignment_id)
            .await?
            .ok_or_else(|| Error::NotFound("Assignment not found".to_string()))?;
        let test = self
            .store
            .get_test(assignment.test_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        Ok(Loaded {
            attempt,
            assignment,
            test,
        })
    }

    async fn candidate(&self, user_id: Option<Uuid>) -> Result<Option<CandidateInfo>> {
        match user_id {
            Some(id) => Ok(self.store.get_user(id).await?.map(CandidateInfo::from)),
            None => Ok(None),
        }
    }
}
