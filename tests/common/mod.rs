#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use proctor_backend::{
    config::Config,
    database::MemoryStore,
    dto::admin_dto::{CreateInviteRequest, CreateQuestionRequest, CreateTestRequest, InviteCreated},
    error::{Error, Result},
    models::{
        attempt::ClientMetadata,
        question::{Question, QuestionType},
        test::Test,
        user::AdminContext,
    },
    services::notification_service::{InviteMailer, InviteNotification},
    utils::time::ManualClock,
    AppState,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".into(),
        database_url: None,
        jwt_secret: JWT_SECRET.into(),
        app_url: "http://localhost:3000".into(),
        app_env: "test".into(),
        public_rps: 1000,
        admin_rps: 1000,
        mail_relay_url: None,
        uploads_dir: std::env::temp_dir()
            .join(format!("proctor-test-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned(),
        max_recording_bytes: 1024,
        deadline_sweep_secs: 30,
        reveal_assigned_email: false,
    }
}

/// Mailer that remembers what it was asked to send, optionally failing.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<InviteNotification>>,
    pub fail: bool,
}

#[async_trait]
impl InviteMailer for CapturingMailer {
    async fn send_invite(&self, notification: &InviteNotification) -> Result<()> {
        if self.fail {
            return Err(Error::Internal("mail relay unavailable".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<CapturingMailer>,
    pub admin: AdminContext,
}

pub fn harness() -> Harness {
    harness_with(test_config(), CapturingMailer::default())
}

pub fn harness_with(config: Config, mailer: CapturingMailer) -> Harness {
    let clock = Arc::new(ManualClock::new(start_time()));
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(mailer);
    let state = AppState::with_parts(store.clone(), clock.clone(), Arc::new(config), mailer.clone());
    Harness {
        state,
        clock,
        store,
        mailer,
        admin: AdminContext::new(Uuid::new_v4()),
    }
}

pub struct TestOptions {
    pub duration_seconds: i32,
    pub block_tab_switch: bool,
    pub auto_flag_threshold: i32,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            duration_seconds: 600,
            block_tab_switch: true,
            auto_flag_threshold: 3,
        }
    }
}

impl Harness {
    pub async fn create_test(&self, options: TestOptions) -> Test {
        self.state
            .test_service
            .create_test(
                &self.admin,
                CreateTestRequest {
                    title: "Rust fundamentals".into(),
                    description: Some("Ownership and borrowing".into()),
                    duration_seconds: options.duration_seconds,
                    camera_required: false,
                    record_video: false,
                    block_tab_switch: options.block_tab_switch,
                    require_fullscreen: true,
                    disable_copy_paste: true,
                    auto_flag_threshold: options.auto_flag_threshold,
                    expires_at: None,
                },
            )
            .await
            .expect("create test")
    }

    pub async fn add_question(
        &self,
        test_id: Uuid,
        question_type: QuestionType,
        marks: i32,
        choices: Option<Vec<&str>>,
        key: JsonValue,
    ) -> Question {
        self.state
            .test_service
            .add_question(
                &self.admin,
                test_id,
                CreateQuestionRequest {
                    question_type,
                    prompt: format!("{:?} question", question_type),
                    image_url: None,
                    marks: Some(marks),
                    order: None,
                    choices: choices.map(|c| c.into_iter().map(String::from).collect()),
                    correct_answer: Some(key),
                },
            )
            .await
            .expect("add question")
    }

    pub async fn invite(
        &self,
        test_id: Uuid,
        email: Option<&str>,
        attempts_allowed: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> InviteCreated {
        self.state
            .invite_service
            .create_invite(
                &self.admin,
                CreateInviteRequest {
                    test_id,
                    user_id: None,
                    email: email.map(String::from),
                    expires_at,
                    attempts_allowed: Some(attempts_allowed),
                    link_mode: None,
                    send_email: email.is_some(),
                },
            )
            .await
            .expect("create invite")
    }

    pub fn metadata(&self) -> ClientMetadata {
        ClientMetadata {
            ip: "203.0.113.7".into(),
            user_agent: "integration-test".into(),
            timestamp: start_time(),
        }
    }
}
