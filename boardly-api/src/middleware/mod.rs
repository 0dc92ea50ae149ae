/// Middleware modules for the API server
///
/// - `auth`: bearer session, admin and cron-secret gates
/// - `rate_limit`: per-user sliding window limiter
/// - `security`: security response headers

pub mod auth;
pub mod rate_limit;
pub mod security;
