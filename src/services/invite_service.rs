use crate::config::Config;
use crate::database::Store;
use crate::dto::admin_dto::{
    AssignmentSummary, AttemptSummary, CandidateInfo, CreateInviteRequest, InviteCreated,
};
use crate::dto::public_dto::{InviteView, PublicTestSummary};
use crate::error::{Error, Result};
use crate::models::assignment::Assignment;
use crate::models::attempt::{Attempt, DisplayStatus};
use crate::models::test::Test;
use crate::models::user::{AdminContext, User};
use crate::services::notification_service::{InviteNotification, NotificationService};
use crate::utils::time::{format_duration, Clock};
use crate::utils::token::generate_invite_token;
use crate::utils::validation::{emails_match, mask_email, name_from_email, normalize_email};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

const TOKEN_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct InviteService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifications: NotificationService,
    config: Arc<Config>,
}

impl InviteService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifications: NotificationService,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            clock,
            notifications,
            config,
        }
    }

    pub async fn create_invite(
        &self,
        admin: &AdminContext,
        payload: CreateInviteRequest,
    ) -> Result<InviteCreated> {
        let test = match self.store.get_test(payload.test_id).await? {
            Some(test) if test.is_owned_by(admin.admin_id) => test,
            _ => return Err(Error::NotFound("Test not found".to_string())),
        };

        let candidate = match (payload.user_id, payload.email.as_deref()) {
            (Some(user_id), _) => Some(
                self.store
                    .get_user(user_id)
                    .await?
                    .ok_or_else(|| Error::NotFound("Candidate not found".to_string()))?,
            ),
            (None, Some(email)) => Some(self.find_or_provision_candidate(email).await?),
            (None, None) => None,
        };

        let invite_token = self.unique_token().await?;
        let assignment = Assignment {
            id: Uuid::new_v4(),
            test_id: test.id,
            user_id: candidate.as_ref().map(|u| u.id),
            invite_token,
            expires_at: payload.expires_at,
            attempts_allowed: payload.attempts_allowed.unwrap_or(1),
            link_mode: payload.link_mode.unwrap_or_default(),
            created_at: self.clock.now(),
        };
        let assignment = self.store.insert_assignment(&assignment).await?;
        let redemption_link = self.config.redemption_link(&assignment.invite_token);

        tracing::info!(
            assignment_id = %assignment.id,
            test_id = %test.id,
            guest = candidate.is_none(),
            "invite created"
        );

        let email_sent = match (&candidate, payload.send_email) {
            (Some(user), true) => {
                let notification = InviteNotification {
                    recipient: user.email.clone(),
                    test_name: test.title.clone(),
                    duration: format_duration(i64::from(test.duration_seconds)),
                    expiry: describe_expiry(assignment.expires_at),
                    redemption_link: redemption_link.clone(),
                };
                self.notifications.notify_invite(&notification).await
            }
            _ => false,
        };

        Ok(InviteCreated {
            invite_token: assignment.invite_token.clone(),
            assignment,
            redemption_link,
            email_sent,
        })
    }

    pub async fn resolve_invite(&self, token: &str) -> Result<Assignment> {
        self.store
            .find_assignment_by_token(token.trim())
            .await?
            .ok_or_else(|| Error::NotFound("Invite not found".to_string()))
    }

    /// Expiry is checked before quota, so an expired invite reports `Expired`
    /// even with attempts left.
    pub async fn validate_for_redemption(
        &self,
        assignment: &Assignment,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        if assignment.is_expired_at(now) {
            return Err(Error::Expired("This invite has expired".to_string()));
        }
        let used = self.store.count_counted_attempts(assignment.id).await?;
        if used >= i64::from(assignment.attempts_allowed) {
            return Err(Error::QuotaExceeded(
                "Maximum number of attempts reached".to_string(),
            ));
        }
        Ok(used)
    }

    /// Unbound assignments accept any email.
    pub async fn verify_identity(&self, assignment: &Assignment, supplied_email: &str) -> Result<()> {
        let Some(candidate) = self.bound_candidate(assignment).await? else {
            return Ok(());
        };
        if emails_match(&candidate.email, supplied_email) {
            return Ok(());
        }

        tracing::warn!(assignment_id = %assignment.id, "invite identity mismatch");
        Err(Error::IdentityMismatch {
            assigned_email_hint: self.email_hint(&candidate.email),
        })
    }

    /// Candidate-facing redemption: resolve, validate, describe.
    pub async fn redeem(&self, token: &str) -> Result<InviteView> {
        let assignment = self.resolve_invite(token).await?;
        let used = self
            .validate_for_redemption(&assignment, self.clock.now())
            .await?;
        self.invite_view(&assignment, used).await
    }

    pub async fn verify(&self, token: &str, email: &str) -> Result<InviteView> {
        let assignment = self.resolve_invite(token).await?;
        let used = self
            .validate_for_redemption(&assignment, self.clock.now())
            .await?;
        self.verify_identity(&assignment, email).await?;
        tracing::info!(assignment_id = %assignment.id, "invite identity verified");
        self.invite_view(&assignment, used).await
    }

    pub async fn list_assignments(
        &self,
        admin: &AdminContext,
        test_id: Option<Uuid>,
    ) -> Result<Vec<AssignmentSummary>> {
        let tests: Vec<Test> = match test_id {
            Some(id) => match self.store.get_test(id).await? {
                Some(test) if test.is_owned_by(admin.admin_id) => vec![test],
                _ => return Err(Error::NotFound("Test not found".to_string())),
            },
            None => self.store.list_tests_by_owner(admin.admin_id).await?,
        };
        let test_ids: Vec<Uuid> = tests.iter().map(|t| t.id).collect();

        let assignments = self.store.list_assignments_for_tests(&test_ids).await?;
        let assignment_ids: Vec<Uuid> = assignments.iter().map(|a| a.id).collect();
        let attempts = self
            .store
            .list_attempts_for_assignments(&assignment_ids)
            .await?;

        let now = self.clock.now();
        let mut out = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let own: Vec<&Attempt> = attempts
                .iter()
                .filter(|a| a.assignment_id == assignment.id)
                .collect();
            let latest = own.iter().max_by_key(|a| a.started_at).copied();

            let latest_attempt = match latest {
                Some(attempt) => Some(AttemptSummary {
                    id: attempt.id,
                    status: attempt.status,
                    score: attempt.score,
                    flagged: attempt.flagged,
                    started_at: attempt.started_at,
                    finished_at: attempt.finished_at,
                    event_count: self.store.count_events(attempt.id).await?,
                    answer_count: self.store.count_answers(attempt.id).await?,
                }),
                None => None,
            };

            let candidate = self.bound_candidate(&assignment).await?.map(CandidateInfo::from);
            let test_title = tests
                .iter()
                .find(|t| t.id == assignment.test_id)
                .map(|t| t.title.clone())
                .unwrap_or_default();

            out.push(AssignmentSummary {
                status: display_status(&assignment, latest, now),
                redemption_link: self.config.redemption_link(&assignment.invite_token),
                attempts_used: own.iter().filter(|a| a.status.counts_against_quota()).count(),
                test_title,
                candidate,
                latest_attempt,
                assignment,
            });
        }
        Ok(out)
    }

    pub async fn delete_assignment(&self, admin: &AdminContext, id: Uuid) -> Result<()> {
        let assignment = self
            .store
            .get_assignment(id)
            .await?
            .ok_or_else(|| Error::NotFound("Assignment not found".to_string()))?;
        self.ensure_owned(admin, &assignment).await?;

        self.store.delete_assignment(assignment.id).await?;
        tracing::info!(assignment_id = %assignment.id, "assignment deleted with its attempts");
        Ok(())
    }

    /// Forbidden when the assignment's test belongs to another admin.
    pub async fn ensure_owned(&self, admin: &AdminContext, assignment: &Assignment) -> Result<Test> {
        match self.store.get_test(assignment.test_id).await? {
            Some(test) if test.is_owned_by(admin.admin_id) => Ok(test),
            Some(_) => Err(Error::Forbidden(
                "This assignment belongs to another administrator".to_string(),
            )),
            None => Err(Error::NotFound("Test not found".to_string())),
        }
    }

    async fn invite_view(&self, assignment: &Assignment, used: i64) -> Result<InviteView> {
        let test = self
            .store
            .get_test(assignment.test_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        let question_count = self.store.list_questions(test.id).await?.len();
        let candidate = self.bound_candidate(assignment).await?;

        Ok(InviteView {
            assignment_id: assignment.id,
            test: PublicTestSummary::new(&test, question_count),
            status: DisplayStatus::Pending,
            expires_at: assignment.expires_at,
            link_mode: assignment.link_mode,
            attempts_allowed: assignment.attempts_allowed,
            attempts_used: used,
            guest: candidate.is_none(),
            candidate_email_hint: candidate.map(|c| self.email_hint(&c.email)),
        })
    }

    fn email_hint(&self, email: &str) -> String {
        if self.config.reveal_assigned_email {
            email.to_string()
        } else {
            mask_email(email)
        }
    }

    async fn bound_candidate(&self, assignment: &Assignment) -> Result<Option<User>> {
        match assignment.user_id {
            Some(user_id) => self.store.get_user(user_id).await,
            None => Ok(None),
        }
    }

    async fn find_or_provision_candidate(&self, email: &str) -> Result<User> {
        let email = normalize_email(email);
        if let Some(user) = self.store.find_user_by_email(&email).await? {
            return Ok(user);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name_from_email(&email),
            email,
            role: "candidate".to_string(),
            created_at: self.clock.now(),
        };
        let user = self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, "provisioned placeholder candidate");
        Ok(user)
    }

    async fn unique_token(&self) -> Result<String> {
        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_invite_token();
            if self.store.find_assignment_by_token(&token).await?.is_none() {
                return Ok(token);
            }
        }
        Err(Error::Internal(
            "Could not generate a unique invite token".to_string(),
        ))
    }
}

/// Status shown for an assignment: the latest attempt's status, otherwise
/// `pending` or `expired` depending on the invite's expiry.
pub fn display_status(
    assignment: &Assignment,
    latest: Option<&Attempt>,
    now: DateTime<Utc>,
) -> DisplayStatus {
    match latest {
        Some(attempt) => DisplayStatus::from(attempt.status),
        None if assignment.is_expired_at(now) => DisplayStatus::Expired,
        None => DisplayStatus::Pending,
    }
}

fn describe_expiry(expires_at: Option<DateTime<Utc>>) -> String {
    match expires_at {
        Some(at) => at.format("%B %-d, %Y %H:%M UTC").to_string(),
        None => "No expiry".to_string(),
    }
}
