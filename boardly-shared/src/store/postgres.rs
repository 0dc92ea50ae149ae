/// PostgreSQL store
///
/// Runtime-checked sqlx queries against the schema in `migrations/`.
/// Enum columns are stored as TEXT and mapped through private row structs,
/// so an unknown value surfaces as [`StoreError::Corrupt`] instead of a
/// silently defaulted model.
///
/// Renumbering batches are single `UPDATE ... FROM UNNEST(...)` statements
/// (or one transaction when a batch spans several statements).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    ArchiveStats, AuditRepo, BoardRepo, CategoryRepo, ColumnPositionUpdate, EntitlementRepo,
    ExportRepo, ProfileRepo, Store, StoreError, StoreResult, TaskRepo,
};
use crate::db::pool::health_check;
use crate::models::audit::{AuditEntry, NotificationLogEntry, SubscriptionEvent};
use crate::models::board::{Board, Column};
use crate::models::category::Category;
use crate::models::entitlement::{
    EnforcementState, Entitlement, EntitlementStatus, Plan, PlanLimits,
};
use crate::models::export_token::{ConsumeOutcome, ExportStatus, ExportToken, ExportType};
use crate::models::profile::Profile;
use crate::models::task::{PositionUpdate, Task};

const TASK_COLUMNS: &str = "id, board_id, column_id, title, description, category, position, \
                            archived, archived_at, created_at, updated_at";

const EXPORT_COLUMNS: &str = "id, token_hash, user_id, export_type, board_id, status, file_url, \
                              expires_at, used_at, created_at";

const ENTITLEMENT_COLUMNS: &str = "user_id, plan, status, board_cap, active_cap_per_board, \
    archived_cap_per_user, archive_retention_days, cancel_at_period_end, cancel_effective_at, \
    courtesy_until, enforcement_state, current_period_end, upgraded_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    user_id: Uuid,
    plan: String,
    status: String,
    board_cap: i32,
    active_cap_per_board: i32,
    archived_cap_per_user: i32,
    archive_retention_days: i32,
    cancel_at_period_end: bool,
    cancel_effective_at: Option<DateTime<Utc>>,
    courtesy_until: Option<DateTime<Utc>>,
    enforcement_state: String,
    current_period_end: Option<DateTime<Utc>>,
    upgraded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn non_negative(value: i32, field: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", field, value)))
}

impl TryFrom<EntitlementRow> for Entitlement {
    type Error = StoreError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let plan = Plan::parse(&row.plan)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown plan '{}'", row.plan)))?;
        let status = EntitlementStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{}'", row.status)))?;
        let enforcement_state = EnforcementState::parse(&row.enforcement_state).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "unknown enforcement state '{}'",
                row.enforcement_state
            ))
        })?;

        Ok(Entitlement {
            user_id: row.user_id,
            plan,
            status,
            board_cap: non_negative(row.board_cap, "board_cap")?,
            active_cap_per_board: non_negative(row.active_cap_per_board, "active_cap_per_board")?,
            archived_cap_per_user: non_negative(
                row.archived_cap_per_user,
                "archived_cap_per_user",
            )?,
            archive_retention_days: non_negative(
                row.archive_retention_days,
                "archive_retention_days",
            )?,
            cancel_at_period_end: row.cancel_at_period_end,
            cancel_effective_at: row.cancel_effective_at,
            courtesy_until: row.courtesy_until,
            enforcement_state,
            current_period_end: row.current_period_end,
            upgraded_at: row.upgraded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExportTokenRow {
    id: Uuid,
    token_hash: String,
    user_id: Uuid,
    export_type: String,
    board_id: Option<Uuid>,
    status: String,
    file_url: Option<String>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExportTokenRow> for ExportToken {
    type Error = StoreError;

    fn try_from(row: ExportTokenRow) -> Result<Self, Self::Error> {
        let export_type = ExportType::parse(&row.export_type).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown export type '{}'", row.export_type))
        })?;
        let status = ExportStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown export status '{}'", row.status)))?;

        Ok(ExportToken {
            id: row.id,
            token_hash: row.token_hash,
            user_id: row.user_id,
            export_type,
            board_id: row.board_id,
            status,
            file_url: row.file_url,
            expires_at: row.expires_at,
            used_at: row.used_at,
            created_at: row.created_at,
        })
    }
}

fn split_updates(updates: &[PositionUpdate]) -> (Vec<Uuid>, Vec<Uuid>, Vec<i32>) {
    let mut ids = Vec::with_capacity(updates.len());
    let mut columns = Vec::with_capacity(updates.len());
    let mut positions = Vec::with_capacity(updates.len());
    for update in updates {
        ids.push(update.task_id);
        columns.push(update.column_id);
        positions.push(update.position);
    }
    (ids, columns, positions)
}

/// Applies a task renumbering batch inside an open transaction
async fn write_positions(
    tx: &mut Transaction<'_, Postgres>,
    updates: &[PositionUpdate],
) -> StoreResult<()> {
    if updates.is_empty() {
        return Ok(());
    }
    let (ids, columns, positions) = split_updates(updates);
    let result = sqlx::query(
        "UPDATE tasks AS t
         SET column_id = u.column_id,
             position = u.position,
             updated_at = CASE WHEN t.column_id <> u.column_id THEN NOW() ELSE t.updated_at END
         FROM UNNEST($1::uuid[], $2::uuid[], $3::int4[]) AS u(id, column_id, position)
         WHERE t.id = u.id",
    )
    .bind(&ids)
    .bind(&columns)
    .bind(&positions)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() != updates.len() as u64 {
        warn!(
            expected = updates.len(),
            affected = result.rows_affected(),
            "Position batch touched fewer rows than expected"
        );
        return Err(StoreError::not_found("task", "position batch member"));
    }
    Ok(())
}

async fn write_column_positions(
    tx: &mut Transaction<'_, Postgres>,
    updates: &[ColumnPositionUpdate],
) -> StoreResult<()> {
    if updates.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = updates.iter().map(|u| u.column_id).collect();
    let positions: Vec<i32> = updates.iter().map(|u| u.position).collect();
    let result = sqlx::query(
        "UPDATE columns AS c
         SET position = u.position
         FROM UNNEST($1::uuid[], $2::int4[]) AS u(id, position)
         WHERE c.id = u.id",
    )
    .bind(&ids)
    .bind(&positions)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() != updates.len() as u64 {
        return Err(StoreError::not_found("column", "position batch member"));
    }
    Ok(())
}

/// PostgreSQL-backed [`Store`]
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntitlementRepo for PgStore {
    async fn find_entitlement(&self, user_id: Uuid) -> StoreResult<Option<Entitlement>> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {} FROM entitlements WHERE user_id = $1",
            ENTITLEMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entitlement::try_from).transpose()
    }

    async fn get_or_create_entitlement(&self, user_id: Uuid) -> StoreResult<Entitlement> {
        let limits = PlanLimits::for_plan(Plan::Free);
        let inserted = sqlx::query(
            "INSERT INTO entitlements
                (user_id, plan, status, board_cap, active_cap_per_board,
                 archived_cap_per_user, archive_retention_days, enforcement_state)
             VALUES ($1, 'free', 'active', $2, $3, $4, $5, 'none')
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(limits.board_cap as i32)
        .bind(limits.active_cap_per_board as i32)
        .bind(limits.archived_cap_per_user as i32)
        .bind(limits.archive_retention_days as i32)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            debug!(user_id = %user_id, "Provisioned default entitlement");
        }

        self.find_entitlement(user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("entitlement", user_id))
    }

    async fn save_entitlement(&self, e: &Entitlement) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO entitlements
                (user_id, plan, status, board_cap, active_cap_per_board, archived_cap_per_user,
                 archive_retention_days, cancel_at_period_end, cancel_effective_at,
                 courtesy_until, enforcement_state, current_period_end, upgraded_at,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
             ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                board_cap = EXCLUDED.board_cap,
                active_cap_per_board = EXCLUDED.active_cap_per_board,
                archived_cap_per_user = EXCLUDED.archived_cap_per_user,
                archive_retention_days = EXCLUDED.archive_retention_days,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                cancel_effective_at = EXCLUDED.cancel_effective_at,
                courtesy_until = EXCLUDED.courtesy_until,
                enforcement_state = EXCLUDED.enforcement_state,
                current_period_end = EXCLUDED.current_period_end,
                upgraded_at = EXCLUDED.upgraded_at,
                updated_at = NOW()",
        )
        .bind(e.user_id)
        .bind(e.plan.as_str())
        .bind(e.status.as_str())
        .bind(e.board_cap as i32)
        .bind(e.active_cap_per_board as i32)
        .bind(e.archived_cap_per_user as i32)
        .bind(e.archive_retention_days as i32)
        .bind(e.cancel_at_period_end)
        .bind(e.cancel_effective_at)
        .bind(e.courtesy_until)
        .bind(e.enforcement_state.as_str())
        .bind(e.current_period_end)
        .bind(e.upgraded_at)
        .bind(e.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_entitlements_by_status(
        &self,
        status: EntitlementStatus,
    ) -> StoreResult<Vec<Entitlement>> {
        let rows = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {} FROM entitlements WHERE status = $1 ORDER BY updated_at",
            ENTITLEMENT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Entitlement::try_from).collect()
    }
}

#[async_trait]
impl ProfileRepo for PgStore {
    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        Ok(
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn ensure_profile(&self, id: Uuid, email: &str) -> StoreResult<Profile> {
        sqlx::query("INSERT INTO profiles (id, email) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .bind(email)
            .execute(&self.pool)
            .await?;

        self.find_profile(id)
            .await?
            .ok_or_else(|| StoreError::not_found("profile", id))
    }

    async fn save_profile(&self, profile: &Profile) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE profiles
             SET email = $2, is_admin = $3, email_notifications = $4,
                 stale_card_alerts = $5, slack_webhook_url = $6
             WHERE id = $1",
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(profile.is_admin)
        .bind(profile.email_notifications)
        .bind(profile.stale_card_alerts)
        .bind(&profile.slack_webhook_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("profile", profile.id));
        }
        Ok(())
    }

    async fn list_stale_alert_profiles(&self) -> StoreResult<Vec<Profile>> {
        Ok(sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles
             WHERE stale_card_alerts AND slack_webhook_url IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl BoardRepo for PgStore {
    async fn insert_board(&self, board: &Board, columns: &[Column]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO boards (id, user_id, title, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(board.id)
        .bind(board.user_id)
        .bind(&board.title)
        .bind(&board.description)
        .bind(board.created_at)
        .bind(board.updated_at)
        .execute(&mut *tx)
        .await?;

        for column in columns {
            sqlx::query("INSERT INTO columns (id, board_id, title, position) VALUES ($1, $2, $3, $4)")
                .bind(column.id)
                .bind(column.board_id)
                .bind(&column.title)
                .bind(column.position)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_board(&self, id: Uuid) -> StoreResult<Option<Board>> {
        Ok(sqlx::query_as::<_, Board>("SELECT * FROM boards WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_boards(&self, user_id: Uuid) -> StoreResult<Vec<Board>> {
        Ok(
            sqlx::query_as::<_, Board>(
                "SELECT * FROM boards WHERE user_id = $1 ORDER BY created_at",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?,
        )
    }

    async fn count_boards(&self, user_id: Uuid) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boards WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }

    async fn update_board(&self, board: &Board) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE boards SET title = $2, description = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(board.id)
        .bind(&board.title)
        .bind(&board.description)
        .bind(board.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("board", board.id));
        }
        Ok(())
    }

    async fn delete_board(&self, id: Uuid) -> StoreResult<()> {
        // columns and tasks cascade
        let result = sqlx::query("DELETE FROM boards WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("board", id));
        }
        Ok(())
    }

    async fn list_columns(&self, board_id: Uuid) -> StoreResult<Vec<Column>> {
        Ok(sqlx::query_as::<_, Column>(
            "SELECT * FROM columns WHERE board_id = $1 ORDER BY position",
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_column(&self, id: Uuid) -> StoreResult<Option<Column>> {
        Ok(sqlx::query_as::<_, Column>("SELECT * FROM columns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_column(&self, column: &Column) -> StoreResult<()> {
        sqlx::query("INSERT INTO columns (id, board_id, title, position) VALUES ($1, $2, $3, $4)")
            .bind(column.id)
            .bind(column.board_id)
            .bind(&column.title)
            .bind(column.position)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rename_column(&self, id: Uuid, title: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE columns SET title = $2 WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("column", id));
        }
        Ok(())
    }

    async fn delete_column(&self, id: Uuid, updates: &[ColumnPositionUpdate]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM columns WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("column", id));
        }
        write_column_positions(&mut tx, updates).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_column_positions(&self, updates: &[ColumnPositionUpdate]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        write_column_positions(&mut tx, updates).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRepo for PgStore {
    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_task_at_top(&self, task: &Task) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE tasks SET position = position + 1
             WHERE column_id = $1 AND NOT archived",
        )
        .bind(task.column_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO tasks
                (id, board_id, column_id, title, description, category, position,
                 archived, archived_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, 0, FALSE, NULL, $7, $8)",
        )
        .bind(task.id)
        .bind(task.board_id)
        .bind(task.column_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.category)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET title = $2, description = $3, category = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.category)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", task.id));
        }
        Ok(())
    }

    async fn list_active_tasks(&self, column_ids: &[Uuid]) -> StoreResult<Vec<Task>> {
        Ok(sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks
             WHERE column_id = ANY($1) AND NOT archived
             ORDER BY column_id, position",
            TASK_COLUMNS
        ))
        .bind(column_ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_board_tasks(&self, board_id: Uuid, archived: bool) -> StoreResult<Vec<Task>> {
        let order = if archived {
            "archived_at DESC"
        } else {
            "column_id, position"
        };
        Ok(sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE board_id = $1 AND archived = $2 ORDER BY {}",
            TASK_COLUMNS, order
        ))
        .bind(board_id)
        .bind(archived)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn apply_position_updates(&self, updates: &[PositionUpdate]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        write_positions(&mut tx, updates).await?;
        tx.commit().await?;
        debug!(rows = updates.len(), "Applied position batch");
        Ok(())
    }

    async fn archive_tasks(
        &self,
        ids: &[Uuid],
        archived_at: DateTime<Utc>,
        updates: &[PositionUpdate],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE tasks SET archived = TRUE, archived_at = $2, updated_at = $2
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(archived_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != ids.len() as u64 {
            return Err(StoreError::not_found("task", "archive batch member"));
        }
        write_positions(&mut tx, updates).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn unarchive_task(&self, id: Uuid, position: i32) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET archived = FALSE, archived_at = NULL, position = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(position)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", id));
        }
        Ok(())
    }

    async fn delete_task(&self, id: Uuid, updates: &[PositionUpdate]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", id));
        }
        write_positions(&mut tx, updates).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_active_tasks(&self, board_id: Uuid) -> StoreResult<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE board_id = $1 AND NOT archived")
                .bind(board_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    async fn count_archived_tasks(&self, user_id: Uuid) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks t
             JOIN boards b ON b.id = t.board_id
             WHERE b.user_id = $1 AND t.archived",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn list_stale_tasks(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Task>> {
        Ok(sqlx::query_as::<_, Task>(
            "SELECT t.id, t.board_id, t.column_id, t.title, t.description, t.category,
                    t.position, t.archived, t.archived_at, t.created_at, t.updated_at
             FROM tasks t
             JOIN boards b ON b.id = t.board_id
             WHERE b.user_id = $1 AND NOT t.archived AND t.updated_at < $2
             ORDER BY t.updated_at",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn prune_archives_for_user(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
        keep_max: u32,
    ) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let expired = sqlx::query(
            "DELETE FROM tasks t USING boards b
             WHERE t.board_id = b.id AND b.user_id = $1 AND t.archived
               AND (t.archived_at IS NULL OR t.archived_at < $2)",
        )
        .bind(user_id)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let overflow = sqlx::query(
            "DELETE FROM tasks WHERE id IN (
                SELECT t.id FROM tasks t
                JOIN boards b ON b.id = t.board_id
                WHERE b.user_id = $1 AND t.archived
                ORDER BY t.archived_at DESC
                OFFSET $2
             )",
        )
        .bind(user_id)
        .bind(keep_max as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(expired.rows_affected() + overflow.rows_affected())
    }

    async fn get_archive_stats(&self, user_id: Uuid) -> StoreResult<ArchiveStats> {
        let (count, oldest): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(t.archived_at) FROM tasks t
             JOIN boards b ON b.id = t.board_id
             WHERE b.user_id = $1 AND t.archived",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ArchiveStats {
            archived_count: count as u32,
            oldest_archived_at: oldest,
        })
    }

    async fn list_users_with_archived(&self) -> StoreResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT b.user_id FROM tasks t
             JOIN boards b ON b.id = t.board_id
             WHERE t.archived",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl CategoryRepo for PgStore {
    async fn list_categories(&self, user_id: Uuid) -> StoreResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT user_id, name, color FROM categories WHERE user_id = $1 ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn upsert_category(&self, category: &Category) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO categories (user_id, name, color) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, name) DO UPDATE SET color = EXCLUDED.color",
        )
        .bind(category.user_id)
        .bind(&category.name)
        .bind(&category.color)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_category(&self, user_id: Uuid, name: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ExportRepo for PgStore {
    async fn insert_export_token(&self, token: &ExportToken) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO export_tokens
                (id, token_hash, user_id, export_type, board_id, status, file_url,
                 expires_at, used_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.export_type.as_str())
        .bind(token.board_id)
        .bind(token.status.as_str())
        .bind(&token.file_url)
        .bind(token.expires_at)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_export_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        let consumed = sqlx::query_as::<_, ExportTokenRow>(&format!(
            "UPDATE export_tokens SET status = 'used', used_at = $2
             WHERE token_hash = $1 AND status = 'ready' AND expires_at > $2
             RETURNING {}",
            EXPORT_COLUMNS
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = consumed {
            return Ok(ConsumeOutcome::Consumed(ExportToken::try_from(row)?));
        }

        let existing = sqlx::query_as::<_, ExportTokenRow>(&format!(
            "SELECT {} FROM export_tokens WHERE token_hash = $1",
            EXPORT_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = existing else {
            return Ok(ConsumeOutcome::NotFound);
        };
        let token = ExportToken::try_from(row)?;
        Ok(match token.status {
            ExportStatus::Used => ConsumeOutcome::AlreadyUsed,
            _ if token.is_expired(now) => ConsumeOutcome::Expired,
            // lost a race against a concurrent download
            ExportStatus::Ready => ConsumeOutcome::AlreadyUsed,
            ExportStatus::Pending => ConsumeOutcome::NotReady,
        })
    }

    async fn mark_export_ready(&self, id: Uuid, file_url: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE export_tokens SET status = 'ready', file_url = $2
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(file_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("export {} is not pending", id)));
        }
        Ok(())
    }

    async fn list_pending_exports(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExportToken>> {
        let rows = sqlx::query_as::<_, ExportTokenRow>(&format!(
            "SELECT {} FROM export_tokens
             WHERE status = 'pending' AND expires_at > $1
             ORDER BY created_at",
            EXPORT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExportToken::try_from).collect()
    }
}

#[async_trait]
impl AuditRepo for PgStore {
    async fn record_admin_action(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO admin_audit_log (id, admin_id, action, target_user_id, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(entry.admin_id)
        .bind(entry.action.as_str())
        .bind(entry.target_user_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_subscription_event(&self, event: &SubscriptionEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO subscription_events (id, user_id, event_type, payload, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_notification(&self, entry: &NotificationLogEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO notifications_log (id, user_id, channel, kind, success, detail, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.channel.as_str())
        .bind(&entry.kind)
        .bind(entry.success)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        health_check(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(plan: &str, status: &str, enforcement: &str) -> EntitlementRow {
        let now = Utc::now();
        EntitlementRow {
            user_id: Uuid::new_v4(),
            plan: plan.to_string(),
            status: status.to_string(),
            board_cap: 1,
            active_cap_per_board: 100,
            archived_cap_per_user: 100,
            archive_retention_days: 30,
            cancel_at_period_end: false,
            cancel_effective_at: None,
            courtesy_until: None,
            enforcement_state: enforcement.to_string(),
            current_period_end: None,
            upgraded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_entitlement_row_maps() {
        let ent = Entitlement::try_from(row("pro", "cancel_scheduled", "none")).unwrap();
        assert_eq!(ent.plan, Plan::Pro);
        assert_eq!(ent.status, EntitlementStatus::CancelScheduled);
    }

    #[test]
    fn test_entitlement_row_rejects_unknown_plan() {
        let err = Entitlement::try_from(row("gold", "active", "none")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_entitlement_row_rejects_negative_cap() {
        let mut bad = row("free", "active", "none");
        bad.board_cap = -1;
        assert!(matches!(
            Entitlement::try_from(bad),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_split_updates_keeps_order() {
        let a = Uuid::new_v4();
        let col = Uuid::new_v4();
        let (ids, cols, positions) = split_updates(&[PositionUpdate {
            task_id: a,
            column_id: col,
            position: 3,
        }]);
        assert_eq!(ids, vec![a]);
        assert_eq!(cols, vec![col]);
        assert_eq!(positions, vec![3]);
    }
}
