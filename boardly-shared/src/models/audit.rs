/// Append-only log records
///
/// # Schema
///
/// ```sql
/// CREATE TABLE notifications_log (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL,
///     channel TEXT NOT NULL,
///     kind TEXT NOT NULL,
///     success BOOLEAN NOT NULL,
///     detail TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE admin_audit_log (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     admin_id UUID NOT NULL,
///     action TEXT NOT NULL,
///     target_user_id UUID NOT NULL,
///     details JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE subscription_events (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID,
///     event_type TEXT NOT NULL,
///     payload JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channel of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Slack,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Slack => "slack",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(NotificationChannel::Email),
            "slack" => Some(NotificationChannel::Slack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: NotificationChannel,
    pub kind: String,
    pub success: bool,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationLogEntry {
    pub fn new(
        user_id: Uuid,
        channel: NotificationChannel,
        kind: impl Into<String>,
        success: bool,
        detail: Option<String>,
    ) -> Self {
        NotificationLogEntry {
            id: Uuid::new_v4(),
            user_id,
            channel,
            kind: kind.into(),
            success,
            detail,
            created_at: Utc::now(),
        }
    }
}

/// Admin action recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    GrantPro,
    RevokePro,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::GrantPro => "grant_pro",
            AdminAction::RevokePro => "revoke_pro",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: AdminAction,
    pub target_user_id: Uuid,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        admin_id: Uuid,
        action: AdminAction,
        target_user_id: Uuid,
        details: serde_json::Value,
    ) -> Self {
        AuditEntry {
            id: Uuid::new_v4(),
            admin_id,
            action,
            target_user_id,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle or billing event tied to a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionEvent {
    pub fn new(
        user_id: Option<Uuid>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        SubscriptionEvent {
            id: Uuid::new_v4(),
            user_id,
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}
