/// User profile and notification preferences
///
/// The profile id equals the auth provider's user id. Rows are created on
/// the first authenticated request.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE profiles (
///     id UUID PRIMARY KEY,
///     email VARCHAR(255) NOT NULL,
///     is_admin BOOLEAN NOT NULL DEFAULT FALSE,
///     email_notifications BOOLEAN NOT NULL DEFAULT TRUE,
///     stale_card_alerts BOOLEAN NOT NULL DEFAULT FALSE,
///     slack_webhook_url TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,

    /// Opt-in for transactional email
    pub email_notifications: bool,

    /// Opt-in for the daily stale card Slack digest
    pub stale_card_alerts: bool,

    #[serde(skip_serializing)]
    pub slack_webhook_url: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: Uuid, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Profile {
            id,
            email: email.into(),
            is_admin: false,
            email_notifications: true,
            stale_card_alerts: false,
            slack_webhook_url: None,
            created_at: now,
        }
    }
}

/// Email settings as exposed over the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub email: String,
    pub email_notifications: bool,
}

impl From<&Profile> for EmailSettings {
    fn from(profile: &Profile) -> Self {
        EmailSettings {
            email: profile.email.clone(),
            email_notifications: profile.email_notifications,
        }
    }
}

/// Slack settings as exposed over the API; the webhook URL is never echoed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackSettings {
    pub connected: bool,
    pub stale_card_alerts: bool,
}

impl From<&Profile> for SlackSettings {
    fn from(profile: &Profile) -> Self {
        SlackSettings {
            connected: profile.slack_webhook_url.is_some(),
            stale_card_alerts: profile.stale_card_alerts,
        }
    }
}

/// Slack incoming webhooks always live under this prefix
pub const SLACK_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/";

pub fn is_slack_webhook_url(url: &str) -> bool {
    url.starts_with(SLACK_WEBHOOK_PREFIX) && url.len() > SLACK_WEBHOOK_PREFIX.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let profile = Profile::new(Uuid::new_v4(), "a@example.com", Utc::now());
        assert!(!profile.is_admin);
        assert!(profile.email_notifications);
        assert!(!SlackSettings::from(&profile).connected);
    }

    #[test]
    fn test_slack_webhook_url_validation() {
        assert!(is_slack_webhook_url("https://hooks.slack.com/services/T0/B0/x"));
        assert!(!is_slack_webhook_url("https://hooks.slack.com/"));
        assert!(!is_slack_webhook_url("https://evil.example.com/services"));
    }
}
