/// Worker configuration
///
/// Loaded from environment variables (with `.env` support via dotenvy).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL URL (optional; in-memory store when absent)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 5)
/// - `RESEND_API_KEY`: email delivery key (optional)
/// - `EMAIL_FROM`: sender address (default: "Boardly <noreply@boardly.app>")
/// - `APP_URL`: link target in emails (default: "http://localhost:3000")
/// - `PRUNE_ARCHIVES_INTERVAL_SECS`: default 3600
/// - `STALE_CARDS_INTERVAL_SECS`: default 86400
/// - `ENFORCE_GRACE_INTERVAL_SECS`: default 900
/// - `PREPARE_EXPORTS_INTERVAL_SECS`: default 30

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub app_url: String,
    pub intervals: JobIntervals,
}

/// How often each maintenance job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobIntervals {
    pub prune_archives: Duration,
    pub stale_cards: Duration,
    pub enforce_grace: Duration,
    pub prepare_exports: Duration,
}

impl Default for JobIntervals {
    fn default() -> Self {
        JobIntervals {
            prune_archives: Duration::from_secs(3600),
            stale_cards: Duration::from_secs(86_400),
            enforce_grace: Duration::from_secs(900),
            prepare_exports: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = JobIntervals::default();
        let intervals = JobIntervals {
            prune_archives: interval_var("PRUNE_ARCHIVES_INTERVAL_SECS", defaults.prune_archives)?,
            stale_cards: interval_var("STALE_CARDS_INTERVAL_SECS", defaults.stale_cards)?,
            enforce_grace: interval_var("ENFORCE_GRACE_INTERVAL_SECS", defaults.enforce_grace)?,
            prepare_exports: interval_var("PREPARE_EXPORTS_INTERVAL_SECS", defaults.prepare_exports)?,
        };

        Ok(WorkerConfig {
            database_url: optional_var("DATABASE_URL"),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            resend_api_key: optional_var("RESEND_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Boardly <noreply@boardly.app>".to_string()),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            intervals,
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reads an interval in seconds; zero is rejected
fn interval_var(key: &str, default: Duration) -> Result<Duration> {
    match optional_var(key) {
        None => Ok(default),
        Some(raw) => parse_interval(&raw).with_context(|| format!("Invalid {}", key)),
    }
}

fn parse_interval(raw: &str) -> Result<Duration> {
    let secs: u64 = raw.trim().parse()?;
    if secs == 0 {
        anyhow::bail!("interval must be at least one second");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        let intervals = JobIntervals::default();
        assert_eq!(intervals.stale_cards, Duration::from_secs(86_400));
        assert!(intervals.prepare_exports < intervals.enforce_grace);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval(" 45 ").unwrap(), Duration::from_secs(45));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("soon").is_err());
    }
}
