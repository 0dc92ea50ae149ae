//! # Boardly Shared Library
//!
//! Domain types, persistence and business logic shared by the Boardly API
//! server and the maintenance worker.
//!
//! ## Module Organization
//!
//! - `models`: rows and request/response data
//! - `store`: the [`store::Store`] trait with Postgres and in-memory backends
//! - `db`: pool creation and migrations
//! - `caps`: cap checks against the user's entitlement
//! - `subscription`: cancellation, grace and admin plan transitions
//! - `over_limit`: resolution wizard for downgraded users
//! - `ordering`: dense position renumbering for drag-and-drop
//! - `boards`: board, column, task and category operations
//! - `session`: optimistic client-side board state
//! - `export`: CSV/JSON export with one-time download tokens
//! - `notify`: Slack and email delivery
//! - `jobs`: periodic maintenance jobs
//! - `auth`: token validation and webhook signatures

pub mod auth;
pub mod boards;
pub mod caps;
pub mod db;
pub mod export;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod ordering;
pub mod over_limit;
pub mod session;
pub mod store;
pub mod subscription;

/// Current version of the Boardly shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
