/// Per-user request rate limiting
///
/// Sliding window limiter kept in process memory. Each key (the
/// authenticated user id) may make `limit` requests in any `window`; the
/// oldest request in the window determines when the next slot opens.
///
/// State lives in a [`RateLimiter`] held by `AppState`, so tests get a fresh
/// limiter per router and can [`RateLimiter::reset`] it. Idle keys are
/// dropped by [`RateLimiter::sweep`], which `main` runs on an interval.
///
/// # Headers
///
/// Responses carry:
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: requests left in the current window
/// - `Retry-After`: seconds to wait (429 responses only)

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
    Extension,
};
use boardly_shared::auth::middleware::AuthContext;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,

    /// Seconds until a slot frees up; zero when allowed
    pub retry_after: u64,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        RateLimiter {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a request for `key` if the window has room
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let entry = hits.entry(key.to_string()).or_default();

        while entry
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            entry.pop_front();
        }

        let used = entry.len() as u32;
        if used < self.limit {
            entry.push_back(now);
            return RateLimitDecision {
                allowed: true,
                limit: self.limit,
                remaining: self.limit - used - 1,
                retry_after: 0,
            };
        }

        let retry_after = entry
            .front()
            .map(|oldest| {
                let wait = self.window.saturating_sub(now.duration_since(*oldest));
                wait.as_secs_f64().ceil() as u64
            })
            .unwrap_or(0)
            .max(1);

        RateLimitDecision {
            allowed: false,
            limit: self.limit,
            remaining: 0,
            retry_after,
        }
    }

    /// Drops keys with no requests inside the window; returns how many
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let before = hits.len();
        hits.retain(|_, entry| {
            entry
                .back()
                .is_some_and(|latest| now.duration_since(*latest) < self.window)
        });
        before - hits.len()
    }

    /// Forgets all recorded requests
    pub async fn reset(&self) {
        self.hits.lock().await.clear();
    }

    pub async fn tracked_keys(&self) -> usize {
        self.hits.lock().await.len()
    }
}

/// Rate limiting middleware
///
/// Runs after authentication and keys on the user id.
///
/// # Errors
///
/// - 429 Too Many Requests: window exhausted
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let decision = state.rate_limiter.check(&auth.user_id.to_string()).await;

    if !decision.allowed {
        tracing::warn!(
            user_id = %auth.user_id,
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );
        return Err(ApiError::RateLimitExceeded {
            retry_after: decision.retry_after,
            message: format!(
                "Rate limit exceeded. Try again in {} seconds",
                decision.retry_after
            ),
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));

    Ok(response)
}
