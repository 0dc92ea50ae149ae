/// Configuration management for the API server
///
/// Configuration is read from environment variables (and a `.env` file in
/// development) into sectioned, type-safe structs.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default `0.0.0.0:8080`)
/// - `CORS_ORIGINS`: comma-separated allowed origins (default `*`)
/// - `APP_ENV`: `production` enables HSTS
/// - `DATABASE_URL`: PostgreSQL connection string; when unset the server
///   runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default 10)
/// - `SUPABASE_JWT_SECRET`: HS256 secret of session tokens (required)
/// - `SUPABASE_SERVICE_ROLE_KEY`, `NEXT_PUBLIC_SUPABASE_URL`: hosted auth project
/// - `CRON_SECRET`: bearer secret of the scheduled job endpoints (required)
/// - `RESEND_API_KEY`, `EMAIL_FROM`, `APP_URL`: transactional email
/// - `PADDLE_WEBHOOK_SECRET`: billing webhook signing secret
/// - `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_WINDOW_SECS`: per-user request window
///
/// # Example
///
/// ```no_run
/// use boardly_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cron: CronConfig,
    pub notifications: NotificationConfig,
    pub billing: BillingConfig,
    pub rate_limit: RateLimitConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; `None` selects the in-memory store
    pub url: Option<String>,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Hosted auth project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret that session tokens are signed with
    ///
    /// Must be at least 32 bytes.
    pub jwt_secret: String,

    pub service_role_key: Option<String>,
    pub supabase_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Bearer secret expected on `/api/cron/*` and the stale card check
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Resend API key; email is disabled without one
    pub resend_api_key: Option<String>,
    pub email_from: String,

    /// Public URL of the web app, used in email links
    pub app_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Webhooks are rejected when unset
    pub paddle_webhook_secret: Option<String>,
}

/// Sliding window applied per authenticated user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a secret is too
    /// short, or a numeric value cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = var_or("API_PORT", 8080u16)?;
        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("SUPABASE_JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("SUPABASE_JWT_SECRET must be at least 32 characters long");
        }

        let cron_secret = env::var("CRON_SECRET")
            .map_err(|_| anyhow::anyhow!("CRON_SECRET environment variable is required"))?;
        if cron_secret.len() < 16 {
            anyhow::bail!("CRON_SECRET must be at least 16 characters long");
        }

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url: optional_var("DATABASE_URL"),
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10u32)?,
            },
            auth: AuthConfig {
                jwt_secret,
                service_role_key: optional_var("SUPABASE_SERVICE_ROLE_KEY"),
                supabase_url: optional_var("NEXT_PUBLIC_SUPABASE_URL"),
            },
            cron: CronConfig { secret: cron_secret },
            notifications: NotificationConfig {
                resend_api_key: optional_var("RESEND_API_KEY"),
                email_from: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "Boardly <notifications@boardly.app>".to_string()),
                app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            billing: BillingConfig {
                paddle_webhook_secret: optional_var("PADDLE_WEBHOOK_SECRET"),
            },
            rate_limit: RateLimitConfig {
                requests_per_window: var_or("RATE_LIMIT_REQUESTS", 120u32)?,
                window_secs: var_or("RATE_LIMIT_WINDOW_SECS", 60u64)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether CORS should allow any origin
    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["https://app.boardly.app".to_string()],
                production: false,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                service_role_key: None,
                supabase_url: None,
            },
            cron: CronConfig {
                secret: "cron-secret-0123456789".to_string(),
            },
            notifications: NotificationConfig {
                resend_api_key: None,
                email_from: "test@example.com".to_string(),
                app_url: "http://localhost:3000".to_string(),
            },
            billing: BillingConfig {
                paddle_webhook_secret: None,
            },
            rate_limit: RateLimitConfig {
                requests_per_window: 60,
                window_secs: 60,
            },
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(config().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_allows_any_origin() {
        let mut config = config();
        assert!(!config.allows_any_origin());
        config.api.cors_origins.push("*".to_string());
        assert!(config.allows_any_origin());
    }
}
