/// API route handlers, one module per resource
///
/// - `health`: liveness and store connectivity
/// - `boards`, `columns`, `tasks`, `categories`: board content
/// - `subscription`: usage, cancellation and the over-limit wizard
/// - `admin`: plan grants and revocations
/// - `settings`: email and Slack preferences
/// - `export`: export requests and one-time downloads
/// - `cron`: scheduled maintenance triggers
/// - `webhooks`: billing provider callbacks

pub mod admin;
pub mod boards;
pub mod categories;
pub mod columns;
pub mod cron;
pub mod export;
pub mod health;
pub mod settings;
pub mod subscription;
pub mod tasks;
pub mod webhooks;
