use crate::database::Store;
use crate::dto::admin_dto::{
    CreateQuestionRequest, CreateTestRequest, TestDetail, TestSummary, UpdateTestRequest,
};
use crate::error::{Error, Result};
use crate::models::question::{AnswerKey, Question, QuestionType};
use crate::models::test::{ProctoringPolicy, Test};
use crate::models::user::AdminContext;
use crate::utils::time::Clock;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TestService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_test(&self, admin: &AdminContext, payload: CreateTestRequest) -> Result<Test> {
        let now = self.clock.now();
        let test = Test {
            id: Uuid::new_v4(),
            created_by: admin.admin_id,
            title: payload.title.trim().to_string(),
            description: payload.description.filter(|d| !d.trim().is_empty()),
            duration_seconds: payload.duration_seconds,
            policy: ProctoringPolicy {
                camera_required: payload.camera_required,
                record_video: payload.record_video,
                block_tab_switch: payload.block_tab_switch,
                require_fullscreen: payload.require_fullscreen,
                disable_copy_paste: payload.disable_copy_paste,
            },
            auto_flag_threshold: payload.auto_flag_threshold,
            expires_at: payload.expires_at,
            created_at: now,
            updated_at: now,
        };
        let test = self.store.insert_test(&test).await?;
        tracing::info!(test_id = %test.id, admin_id = %admin.admin_id, "test created");
        Ok(test)
    }

    pub async fn list_tests(&self, admin: &AdminContext) -> Result<Vec<TestSummary>> {
        let tests = self.store.list_tests_by_owner(admin.admin_id).await?;
        let ids: Vec<Uuid> = tests.iter().map(|t| t.id).collect();
        let assignments = self.store.list_assignments_for_tests(&ids).await?;

        let mut out = Vec::with_capacity(tests.len());
        for test in tests {
            let question_count = self.store.list_questions(test.id).await?.len();
            let assignment_count = assignments.iter().filter(|a| a.test_id == test.id).count();
            out.push(TestSummary {
                test,
                question_count,
                assignment_count,
            });
        }
        Ok(out)
    }

    pub async fn get_test(&self, admin: &AdminContext, id: Uuid) -> Result<TestDetail> {
        let test = self.owned_test(admin, id).await?;
        let questions = self.store.list_questions(test.id).await?;
        Ok(TestDetail { test, questions })
    }

    pub async fn update_test(
        &self,
        admin: &AdminContext,
        id: Uuid,
        payload: UpdateTestRequest,
    ) -> Result<Test> {
        let mut test = self.owned_test(admin, id).await?;

        if let Some(title) = payload.title {
            test.title = title.trim().to_string();
        }
        if let Some(description) = payload.description {
            test.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(duration) = payload.duration_seconds {
            test.duration_seconds = duration;
        }
        if let Some(v) = payload.camera_required {
            test.policy.camera_required = v;
        }
        if let Some(v) = payload.record_video {
            test.policy.record_video = v;
        }
        if let Some(v) = payload.block_tab_switch {
            test.policy.block_tab_switch = v;
        }
        if let Some(v) = payload.require_fullscreen {
            test.policy.require_fullscreen = v;
        }
        if let Some(v) = payload.disable_copy_paste {
            test.policy.disable_copy_paste = v;
        }
        if let Some(threshold) = payload.auto_flag_threshold {
            test.auto_flag_threshold = threshold;
        }
        if payload.expires_at.is_some() {
            test.expires_at = payload.expires_at;
        }
        test.updated_at = self.clock.now();

        self.store.update_test(&test).await
    }

    pub async fn delete_test(&self, admin: &AdminContext, id: Uuid) -> Result<()> {
        let test = self.owned_test(admin, id).await?;
        self.store.delete_test(test.id).await?;
        tracing::info!(test_id = %test.id, "test deleted with its assignments and attempts");
        Ok(())
    }

    pub async fn add_question(
        &self,
        admin: &AdminContext,
        test_id: Uuid,
        payload: CreateQuestionRequest,
    ) -> Result<Question> {
        let test = self.owned_test(admin, test_id).await?;

        let prompt = payload.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(Error::BadRequest("Question prompt is required".to_string()));
        }

        let choices: Vec<String> = payload
            .choices
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if payload.question_type.needs_choices() && choices.is_empty() {
            return Err(Error::BadRequest(format!(
                "Questions of type {:?} need at least one choice",
                payload.question_type
            )));
        }

        let correct_answer = match payload.correct_answer.as_ref() {
            Some(raw) => normalize_key(payload.question_type, raw, &choices)?,
            None => None,
        };

        let position = match payload.order {
            Some(order) => order,
            None => self.store.list_questions(test.id).await?.len() as i32,
        };

        let question = Question {
            id: Uuid::new_v4(),
            test_id: test.id,
            question_type: payload.question_type,
            prompt,
            image_url: payload
                .image_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            marks: payload.marks.unwrap_or(1),
            position,
            choices: if choices.is_empty() { None } else { Some(json!(choices)) },
            correct_answer,
            created_at: self.clock.now(),
        };
        self.store.insert_question(&question).await
    }

    async fn owned_test(&self, admin: &AdminContext, id: Uuid) -> Result<Test> {
        match self.store.get_test(id).await? {
            Some(test) if test.is_owned_by(admin.admin_id) => Ok(test),
            _ => Err(Error::NotFound("Test not found".to_string())),
        }
    }
}

/// Validates a submitted key against the question type and rewrites it into
/// the stored `{ "value": .. }` form.
fn normalize_key(
    question_type: QuestionType,
    raw: &serde_json::Value,
    choices: &[String],
) -> Result<Option<serde_json::Value>> {
    let key = AnswerKey::from_json(raw).map_err(|e| Error::BadRequest(e.to_string()))?;
    let Some(key) = key else {
        return Ok(None);
    };

    let key = match (question_type, key) {
        (QuestionType::Mcq, AnswerKey::Scalar(v)) => AnswerKey::Set(vec![v]),
        (QuestionType::Mcq, set) => set,
        (_, AnswerKey::Set(values)) if values.len() == 1 => {
            AnswerKey::Scalar(values.into_iter().next().unwrap_or_default())
        }
        (_, AnswerKey::Set(_)) => {
            return Err(Error::BadRequest(
                "Only mcq questions accept more than one correct answer".to_string(),
            ))
        }
        (_, scalar) => scalar,
    };

    if question_type.needs_choices() {
        let known = |v: &String| {
            choices
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(v.trim()))
        };
        if !key.as_list().iter().all(known) {
            return Err(Error::BadRequest(
                "Correct answer must be one of the question's choices".to_string(),
            ));
        }
    }

    Ok(Some(key.to_json()))
}
