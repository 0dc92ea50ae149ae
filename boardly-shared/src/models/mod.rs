/// Domain models for Boardly
///
/// Plain data types shared by the API server, the worker and the stores.
/// Persistence lives behind the [`crate::store::Store`] trait.
///
/// # Models
///
/// - `entitlement`: plan tier, caps and subscription state
/// - `board`: boards, columns and the assembled board view
/// - `task`: tasks and position renumbering rows
/// - `category`: per-user label/color pairs
/// - `export_token`: one-time export download handles
/// - `profile`: user profile and notification preferences
/// - `audit`: notification, admin and subscription logs

pub mod audit;
pub mod board;
pub mod category;
pub mod entitlement;
pub mod export_token;
pub mod profile;
pub mod task;
