/// Authentication primitives
///
/// - [`jwt`]: validation of provider-issued session tokens
/// - [`middleware`]: bearer extraction and the [`middleware::AuthContext`] extractor
/// - [`token`]: one-time export tokens and constant-time secret comparison
/// - [`webhook`]: billing webhook signature verification

pub mod jwt;
pub mod middleware;
pub mod token;
pub mod webhook;
