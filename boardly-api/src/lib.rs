//! # Boardly API Server Library
//!
//! HTTP surface of Boardly: boards, drag-and-drop task ordering, plan caps,
//! subscriptions, exports and notification settings.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Authentication, rate limiting and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
