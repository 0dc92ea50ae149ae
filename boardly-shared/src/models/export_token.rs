/// One-time export download tokens
///
/// The plaintext token is returned to the caller once. Only its SHA-256
/// hash is stored, so a leaked table dump cannot be replayed against the
/// download endpoint.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE export_tokens (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     user_id UUID NOT NULL,
///     export_type TEXT NOT NULL,
///     board_id UUID,
///     status TEXT NOT NULL DEFAULT 'pending',
///     file_url TEXT,
///     expires_at TIMESTAMPTZ NOT NULL,
///     used_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifetime of an export token
pub const EXPORT_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    Csv,
    Json,
}

impl ExportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportType::Csv => "csv",
            ExportType::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(ExportType::Csv),
            "json" => Some(ExportType::Json),
            _ => None,
        }
    }

    /// HTTP content type of the rendered export
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportType::Csv => "text/csv; charset=utf-8",
            ExportType::Json => "application/json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Queued for the worker
    Pending,

    /// Downloadable
    Ready,

    /// Consumed by a download
    Used,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Ready => "ready",
            ExportStatus::Used => "used",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExportStatus::Pending),
            "ready" => Some(ExportStatus::Ready),
            "used" => Some(ExportStatus::Used),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportToken {
    pub id: Uuid,

    /// Hex SHA-256 of the plaintext token
    #[serde(skip_serializing)]
    pub token_hash: String,

    pub user_id: Uuid,
    pub export_type: ExportType,

    /// Single-board export when set, all boards otherwise
    pub board_id: Option<Uuid>,

    pub status: ExportStatus,
    pub file_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ExportToken {
    /// Builds a new token record expiring after the standard TTL
    pub fn issue(
        token_hash: String,
        user_id: Uuid,
        export_type: ExportType,
        board_id: Option<Uuid>,
        status: ExportStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        let file_url = match status {
            ExportStatus::Pending => None,
            _ => Some(Self::file_url_for(id, export_type)),
        };
        ExportToken {
            id,
            token_hash,
            user_id,
            export_type,
            board_id,
            status,
            file_url,
            expires_at: now + Duration::hours(EXPORT_TOKEN_TTL_HOURS),
            used_at: None,
            created_at: now,
        }
    }

    /// Storage key of the rendered file
    pub fn file_url_for(id: Uuid, export_type: ExportType) -> String {
        format!("exports/{}.{}", id, export_type.as_str())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of an attempt to consume a token
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// Token was ready and is now marked used
    Consumed(ExportToken),
    NotFound,
    AlreadyUsed,
    Expired,
    NotReady,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_sets_ttl_and_file_url() {
        let now = Utc::now();
        let token = ExportToken::issue(
            "abc".to_string(),
            Uuid::new_v4(),
            ExportType::Csv,
            None,
            ExportStatus::Ready,
            now,
        );
        assert_eq!(token.expires_at - now, Duration::hours(24));
        assert_eq!(
            token.file_url.as_deref(),
            Some(format!("exports/{}.csv", token.id).as_str())
        );
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::hours(24)));
    }

    #[test]
    fn test_pending_token_has_no_file() {
        let token = ExportToken::issue(
            "abc".to_string(),
            Uuid::new_v4(),
            ExportType::Json,
            Some(Uuid::new_v4()),
            ExportStatus::Pending,
            Utc::now(),
        );
        assert!(token.file_url.is_none());
    }

    #[test]
    fn test_token_hash_not_serialized() {
        let token = ExportToken::issue(
            "secret-hash".to_string(),
            Uuid::new_v4(),
            ExportType::Json,
            None,
            ExportStatus::Ready,
            Utc::now(),
        );
        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
