/// Outbound notifications (Slack incoming webhooks, Resend email)
///
/// Delivery is opaque to callers: [`Notifier::send`] either succeeds or
/// returns a [`NotifyError`]. [`send_logged`] wraps a send with a
/// `notifications_log` row recording the outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::audit::{NotificationChannel, NotificationLogEntry};
use crate::models::task::Task;
use crate::store::Store;

pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{0} delivery is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Slack {
        webhook_url: String,
        text: String,
    },
    Email {
        to: String,
        subject: String,
        html: String,
    },
}

impl Message {
    pub fn channel(&self) -> NotificationChannel {
        match self {
            Message::Slack { .. } => NotificationChannel::Slack,
            Message::Email { .. } => NotificationChannel::Email,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

/// reqwest-backed delivery
pub struct HttpNotifier {
    client: reqwest::Client,
    resend_api_key: Option<String>,
    email_from: String,
}

impl HttpNotifier {
    pub fn new(resend_api_key: Option<String>, email_from: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(HttpNotifier {
            client,
            resend_api_key,
            email_from: email_from.into(),
        })
    }

    async fn check(resp: reqwest::Response) -> Result<(), NotifyError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        match message {
            Message::Slack { webhook_url, text } => {
                let resp = self
                    .client
                    .post(webhook_url)
                    .json(&json!({ "text": text }))
                    .send()
                    .await?;
                Self::check(resp).await
            }
            Message::Email { to, subject, html } => {
                let key = self
                    .resend_api_key
                    .as_deref()
                    .ok_or(NotifyError::NotConfigured("email"))?;
                let resp = self
                    .client
                    .post(RESEND_API_URL)
                    .bearer_auth(key)
                    .json(&json!({
                        "from": self.email_from,
                        "to": [to],
                        "subject": subject,
                        "html": html,
                    }))
                    .send()
                    .await?;
                Self::check(resp).await
            }
        }
    }
}

/// Keeps messages in memory instead of delivering them
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Message>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, value: bool) {
        self.fail.store(value, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Message> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "recording notifier set to fail".to_string(),
            });
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Sends a message and records the outcome in the notifications log
///
/// Logging failures are swallowed; the delivery result is returned.
pub async fn send_logged(
    store: &Arc<dyn Store>,
    notifier: &dyn Notifier,
    user_id: Uuid,
    kind: &str,
    message: &Message,
) -> Result<(), NotifyError> {
    let result = notifier.send(message).await;
    let detail = result.as_ref().err().map(|e| e.to_string());
    let entry = NotificationLogEntry::new(user_id, message.channel(), kind, result.is_ok(), detail);

    if let Err(e) = store.record_notification(&entry).await {
        warn!(user_id = %user_id, error = %e, "Failed to record notification");
    }
    match &result {
        Ok(()) => debug!(user_id = %user_id, kind = kind, "Notification sent"),
        Err(e) => warn!(user_id = %user_id, kind = kind, error = %e, "Notification failed"),
    }
    result
}

/// Slack text listing cards untouched for `days`
pub fn stale_cards_text(tasks: &[Task], days: i64) -> String {
    let mut text = format!(
        ":hourglass: {} card{} untouched for more than {} days:\n",
        tasks.len(),
        if tasks.len() == 1 { "" } else { "s" },
        days
    );
    for task in tasks {
        text.push_str(&format!("• {}\n", task.title));
    }
    text
}

/// Email sent when a user is put into read-only lockdown
pub fn lockdown_email(to: &str, app_url: &str) -> Message {
    Message::Email {
        to: to.to_string(),
        subject: "Your Boardly account is read-only".to_string(),
        html: format!(
            "<p>Your courtesy period has ended and your boards exceed the Free plan limits.</p>\
             <p><a href=\"{}/settings/billing\">Choose a board to keep or upgrade</a> to continue editing.</p>",
            app_url.trim_end_matches('/')
        ),
    }
}
