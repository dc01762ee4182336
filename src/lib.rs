pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::database::Store;
use crate::services::{
    attempt_service::AttemptService,
    integrity_service::IntegrityService,
    invite_service::InviteService,
    notification_service::{HttpMailer, InviteMailer, LogMailer, NotificationService},
    recording_service::RecordingService,
    test_service::TestService,
};
use crate::utils::time::{Clock, SystemClock};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
    pub test_service: TestService,
    pub invite_service: InviteService,
    pub attempt_service: AttemptService,
    pub integrity_service: IntegrityService,
    pub recording_service: RecordingService,
}

impl AppState {
    /// Production wiring: system clock, and the HTTP mail relay when one is
    /// configured.
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        let mailer: Arc<dyn InviteMailer> = match &config.mail_relay_url {
            Some(url) => Arc::new(HttpMailer::new(url.clone())),
            None => Arc::new(LogMailer),
        };
        Self::with_parts(store, Arc::new(SystemClock), config, mailer)
    }

    pub fn with_parts(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
        mailer: Arc<dyn InviteMailer>,
    ) -> Self {
        let notifications = NotificationService::new(mailer);
        let test_service = TestService::new(store.clone(), clock.clone());
        let invite_service =
            InviteService::new(store.clone(), clock.clone(), notifications, config.clone());
        let attempt_service =
            AttemptService::new(store.clone(), clock.clone(), invite_service.clone());
        let integrity_service = IntegrityService::new(store.clone(), clock.clone());
        let recording_service = RecordingService::new(
            store.clone(),
            clock.clone(),
            config.uploads_dir.clone(),
            config.max_recording_bytes,
        );

        Self {
            store,
            clock,
            config,
            test_service,
            invite_service,
            attempt_service,
            integrity_service,
            recording_service,
        }
    }
}
