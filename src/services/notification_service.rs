use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload of the single mail the core sends: an invite to take a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteNotification {
    pub recipient: String,
    pub test_name: String,
    pub duration: String,
    pub expiry: String,
    pub redemption_link: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InviteMailer: Send + Sync {
    async fn send_invite(&self, notification: &InviteNotification) -> Result<()>;
}

/// Posts the notification as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    relay_url: String,
}

impl HttpMailer {
    pub fn new(relay_url: String) -> Self {
        Self {
            client: Client::new(),
            relay_url,
        }
    }
}

#[async_trait]
impl InviteMailer for HttpMailer {
    async fn send_invite(&self, notification: &InviteNotification) -> Result<()> {
        self.client
            .post(&self.relay_url)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Used when no relay is configured; the invite link ends up in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl InviteMailer for LogMailer {
    async fn send_invite(&self, notification: &InviteNotification) -> Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            test = %notification.test_name,
            link = %notification.redemption_link,
            "no mail relay configured, invite not mailed"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationService {
    mailer: Arc<dyn InviteMailer>,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn InviteMailer>) -> Self {
        Self { mailer }
    }

    /// Best effort: returns whether the mail went out, never an error.
    pub async fn notify_invite(&self, notification: &InviteNotification) -> bool {
        match self.mailer.send_invite(notification).await {
            Ok(()) => {
                tracing::info!(recipient = %notification.recipient, "invite email sent");
                true
            }
            Err(err) => {
                tracing::warn!(
                    recipient = %notification.recipient,
                    error = %err,
                    "failed to send invite email"
                );
                false
            }
        }
    }
}
