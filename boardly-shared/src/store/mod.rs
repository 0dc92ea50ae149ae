/// Persistence contracts
///
/// Every piece of state Boardly owns goes through the repository traits in
/// this module. Two implementations exist:
///
/// - [`postgres::PgStore`]: production store on sqlx/PostgreSQL
/// - [`memory::MemoryStore`]: in-process store for tests and local runs
///
/// Batch writes (`apply_position_updates`, `archive_tasks`, `delete_task`,
/// `delete_column`, `insert_task_at_top`) are all-or-nothing in both stores.
///
/// # Example
///
/// ```no_run
/// use boardly_shared::store::{memory::MemoryStore, EntitlementRepo};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), boardly_shared::store::StoreError> {
/// let store = MemoryStore::new();
/// let ent = store.get_or_create_entitlement(Uuid::new_v4()).await?;
/// assert_eq!(ent.board_cap, 1);
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::audit::{AuditEntry, NotificationLogEntry, SubscriptionEvent};
use crate::models::board::{Board, Column};
use crate::models::category::Category;
use crate::models::entitlement::{Entitlement, EntitlementStatus};
use crate::models::export_token::{ConsumeOutcome, ExportToken};
use crate::models::profile::Profile;
use crate::models::task::{PositionUpdate, Task};

/// Store error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row addressed by id does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint or state conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored value cannot be mapped back to a model
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// New dense position of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPositionUpdate {
    pub column_id: Uuid,
    pub position: i32,
}

/// Archive bookkeeping for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub archived_count: u32,
    pub oldest_archived_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait EntitlementRepo: Send + Sync {
    async fn find_entitlement(&self, user_id: Uuid) -> StoreResult<Option<Entitlement>>;

    /// Returns the user's entitlement, inserting free-plan defaults if absent
    async fn get_or_create_entitlement(&self, user_id: Uuid) -> StoreResult<Entitlement>;

    /// Upserts the full record
    async fn save_entitlement(&self, entitlement: &Entitlement) -> StoreResult<()>;

    async fn list_entitlements_by_status(
        &self,
        status: EntitlementStatus,
    ) -> StoreResult<Vec<Entitlement>>;
}

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;

    /// Case-insensitive lookup
    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>>;

    /// Returns the profile, creating it with defaults if absent
    async fn ensure_profile(&self, id: Uuid, email: &str) -> StoreResult<Profile>;

    async fn save_profile(&self, profile: &Profile) -> StoreResult<()>;

    /// Profiles opted into stale card alerts with a Slack webhook configured
    async fn list_stale_alert_profiles(&self) -> StoreResult<Vec<Profile>>;
}

#[async_trait]
pub trait BoardRepo: Send + Sync {
    /// Inserts a board together with its initial columns
    async fn insert_board(&self, board: &Board, columns: &[Column]) -> StoreResult<()>;

    async fn find_board(&self, id: Uuid) -> StoreResult<Option<Board>>;

    /// Boards of a user, oldest first
    async fn list_boards(&self, user_id: Uuid) -> StoreResult<Vec<Board>>;

    async fn count_boards(&self, user_id: Uuid) -> StoreResult<u32>;

    async fn update_board(&self, board: &Board) -> StoreResult<()>;

    /// Deletes a board with its columns and tasks
    async fn delete_board(&self, id: Uuid) -> StoreResult<()>;

    /// Columns of a board in position order
    async fn list_columns(&self, board_id: Uuid) -> StoreResult<Vec<Column>>;

    async fn find_column(&self, id: Uuid) -> StoreResult<Option<Column>>;

    async fn insert_column(&self, column: &Column) -> StoreResult<()>;

    async fn rename_column(&self, id: Uuid, title: &str) -> StoreResult<()>;

    /// Deletes a column and its tasks, then renumbers the remaining columns
    async fn delete_column(&self, id: Uuid, updates: &[ColumnPositionUpdate]) -> StoreResult<()>;

    async fn apply_column_positions(&self, updates: &[ColumnPositionUpdate]) -> StoreResult<()>;
}

#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>>;

    /// Shifts every active task of the column down by one and inserts the
    /// new task at position 0
    async fn insert_task_at_top(&self, task: &Task) -> StoreResult<()>;

    /// Writes title, description, category and `updated_at`
    async fn update_task(&self, task: &Task) -> StoreResult<()>;

    /// Active tasks of the given columns, ordered by position
    async fn list_active_tasks(&self, column_ids: &[Uuid]) -> StoreResult<Vec<Task>>;

    /// Tasks of a board with the given archived flag
    async fn list_board_tasks(&self, board_id: Uuid, archived: bool) -> StoreResult<Vec<Task>>;

    /// Writes a renumbering batch atomically
    async fn apply_position_updates(&self, updates: &[PositionUpdate]) -> StoreResult<()>;

    /// Archives tasks and renumbers their former siblings atomically
    async fn archive_tasks(
        &self,
        ids: &[Uuid],
        archived_at: DateTime<Utc>,
        updates: &[PositionUpdate],
    ) -> StoreResult<()>;

    /// Restores an archived task at the given position
    async fn unarchive_task(&self, id: Uuid, position: i32) -> StoreResult<()>;

    /// Hard-deletes a task and renumbers its former siblings atomically
    async fn delete_task(&self, id: Uuid, updates: &[PositionUpdate]) -> StoreResult<()>;

    async fn count_active_tasks(&self, board_id: Uuid) -> StoreResult<u32>;

    /// Archived tasks across every board of the user
    async fn count_archived_tasks(&self, user_id: Uuid) -> StoreResult<u32>;

    /// Active tasks of the user last touched before `cutoff`
    async fn list_stale_tasks(&self, user_id: Uuid, cutoff: DateTime<Utc>)
        -> StoreResult<Vec<Task>>;

    /// Deletes archived tasks older than `cutoff`, then the oldest archived
    /// tasks beyond `keep_max`. Returns the number deleted.
    async fn prune_archives_for_user(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
        keep_max: u32,
    ) -> StoreResult<u64>;

    async fn get_archive_stats(&self, user_id: Uuid) -> StoreResult<ArchiveStats>;

    /// Owners of at least one archived task
    async fn list_users_with_archived(&self) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self, user_id: Uuid) -> StoreResult<Vec<Category>>;

    /// Inserts or recolors a category
    async fn upsert_category(&self, category: &Category) -> StoreResult<()>;

    /// Returns whether a category was removed
    async fn delete_category(&self, user_id: Uuid, name: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait ExportRepo: Send + Sync {
    async fn insert_export_token(&self, token: &ExportToken) -> StoreResult<()>;

    /// Marks a ready token used in one step; a token is consumed at most once
    async fn consume_export_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome>;

    async fn mark_export_ready(&self, id: Uuid, file_url: &str) -> StoreResult<()>;

    /// Pending tokens that have not expired
    async fn list_pending_exports(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExportToken>>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn record_admin_action(&self, entry: &AuditEntry) -> StoreResult<()>;

    async fn record_subscription_event(&self, event: &SubscriptionEvent) -> StoreResult<()>;

    async fn record_notification(&self, entry: &NotificationLogEntry) -> StoreResult<()>;
}

/// Full persistence surface used by services
#[async_trait]
pub trait Store:
    EntitlementRepo + ProfileRepo + BoardRepo + TaskRepo + CategoryRepo + ExportRepo + AuditRepo
{
    /// Cheap liveness probe
    async fn ping(&self) -> StoreResult<()>;
}
