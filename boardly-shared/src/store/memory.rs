/// In-memory store
///
/// Backs the integration tests and `DATABASE_URL`-less local runs. All
/// state sits behind a single async mutex, so every method (batches
/// included) is atomic with respect to other callers.
///
/// Failure injection is available for tests:
///
/// - [`MemoryStore::set_unavailable`]: every call fails
/// - [`MemoryStore::set_fail_writes`]: reads succeed, mutations fail
/// - [`MemoryStore::set_fail_audit`]: only audit/event/notification inserts fail

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ArchiveStats, AuditRepo, BoardRepo, CategoryRepo, ColumnPositionUpdate, EntitlementRepo,
    ExportRepo, ProfileRepo, Store, StoreError, StoreResult, TaskRepo,
};
use crate::models::audit::{AuditEntry, NotificationLogEntry, SubscriptionEvent};
use crate::models::board::{Board, Column};
use crate::models::category::Category;
use crate::models::entitlement::{Entitlement, EntitlementStatus};
use crate::models::export_token::{ConsumeOutcome, ExportStatus, ExportToken};
use crate::models::profile::Profile;
use crate::models::task::{PositionUpdate, Task};

#[derive(Default)]
struct State {
    entitlements: HashMap<Uuid, Entitlement>,
    profiles: HashMap<Uuid, Profile>,
    boards: HashMap<Uuid, Board>,
    columns: HashMap<Uuid, Column>,
    tasks: HashMap<Uuid, Task>,
    categories: HashMap<(Uuid, String), Category>,
    exports: HashMap<Uuid, ExportToken>,
    admin_audit: Vec<AuditEntry>,
    subscription_events: Vec<SubscriptionEvent>,
    notifications: Vec<NotificationLogEntry>,
}

impl State {
    fn board_ids_of(&self, user_id: Uuid) -> Vec<Uuid> {
        self.boards
            .values()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.id)
            .collect()
    }

    fn archived_of(&self, user_id: Uuid) -> Vec<&Task> {
        let boards = self.board_ids_of(user_id);
        self.tasks
            .values()
            .filter(|t| t.archived && boards.contains(&t.board_id))
            .collect()
    }

    fn ensure_tasks_exist(&self, ids: impl IntoIterator<Item = Uuid>) -> StoreResult<()> {
        for id in ids {
            if !self.tasks.contains_key(&id) {
                return Err(StoreError::not_found("task", id));
            }
        }
        Ok(())
    }

    /// Renumbering alone keeps `updated_at`; only a column change counts as an edit
    fn apply_positions(&mut self, updates: &[PositionUpdate]) {
        let now = Utc::now();
        for update in updates {
            if let Some(task) = self.tasks.get_mut(&update.task_id) {
                if task.column_id != update.column_id {
                    task.column_id = update.column_id;
                    task.updated_at = now;
                }
                task.position = update.position;
            }
        }
    }
}

/// Thread-safe in-memory [`Store`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
    fail_audit: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    /// Makes every subsequent mutation fail
    pub fn set_fail_writes(&self, value: bool) {
        self.fail_writes.store(value, Ordering::SeqCst);
    }

    /// Makes audit, event and notification inserts fail
    pub fn set_fail_audit(&self, value: bool) {
        self.fail_audit.store(value, Ordering::SeqCst);
    }

    /// Number of mutating calls accepted so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn admin_audit_log(&self) -> Vec<AuditEntry> {
        self.state.lock().await.admin_audit.clone()
    }

    pub async fn subscription_events(&self) -> Vec<SubscriptionEvent> {
        self.state.lock().await.subscription_events.clone()
    }

    pub async fn notifications(&self) -> Vec<NotificationLogEntry> {
        self.state.lock().await.notifications.clone()
    }

    fn read(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> StoreResult<()> {
        self.read()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store rejects writes".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn audit_write(&self) -> StoreResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log offline".to_string()));
        }
        self.write()
    }
}

#[async_trait]
impl EntitlementRepo for MemoryStore {
    async fn find_entitlement(&self, user_id: Uuid) -> StoreResult<Option<Entitlement>> {
        self.read()?;
        Ok(self.state.lock().await.entitlements.get(&user_id).cloned())
    }

    async fn get_or_create_entitlement(&self, user_id: Uuid) -> StoreResult<Entitlement> {
        self.read()?;
        let mut state = self.state.lock().await;
        if let Some(ent) = state.entitlements.get(&user_id) {
            return Ok(ent.clone());
        }
        self.write()?;
        let ent = Entitlement::free_default(user_id, Utc::now());
        state.entitlements.insert(user_id, ent.clone());
        Ok(ent)
    }

    async fn save_entitlement(&self, entitlement: &Entitlement) -> StoreResult<()> {
        self.write()?;
        let mut ent = entitlement.clone();
        ent.updated_at = Utc::now();
        self.state.lock().await.entitlements.insert(ent.user_id, ent);
        Ok(())
    }

    async fn list_entitlements_by_status(
        &self,
        status: EntitlementStatus,
    ) -> StoreResult<Vec<Entitlement>> {
        self.read()?;
        let state = self.state.lock().await;
        Ok(state
            .entitlements
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileRepo for MemoryStore {
    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        self.read()?;
        Ok(self.state.lock().await.profiles.get(&id).cloned())
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        self.read()?;
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn ensure_profile(&self, id: Uuid, email: &str) -> StoreResult<Profile> {
        self.read()?;
        let mut state = self.state.lock().await;
        if let Some(profile) = state.profiles.get(&id) {
            return Ok(profile.clone());
        }
        self.write()?;
        let profile = Profile::new(id, email, Utc::now());
        state.profiles.insert(id, profile.clone());
        Ok(profile)
    }

    async fn save_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.write()?;
        self.state
            .lock()
            .await
            .profiles
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn list_stale_alert_profiles(&self) -> StoreResult<Vec<Profile>> {
        self.read()?;
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .values()
            .filter(|p| p.stale_card_alerts && p.slack_webhook_url.is_some())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BoardRepo for MemoryStore {
    async fn insert_board(&self, board: &Board, columns: &[Column]) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        state.boards.insert(board.id, board.clone());
        for column in columns {
            state.columns.insert(column.id, column.clone());
        }
        Ok(())
    }

    async fn find_board(&self, id: Uuid) -> StoreResult<Option<Board>> {
        self.read()?;
        Ok(self.state.lock().await.boards.get(&id).cloned())
    }

    async fn list_boards(&self, user_id: Uuid) -> StoreResult<Vec<Board>> {
        self.read()?;
        let state = self.state.lock().await;
        let mut boards: Vec<Board> = state
            .boards
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        boards.sort_by_key(|b| b.created_at);
        Ok(boards)
    }

    async fn count_boards(&self, user_id: Uuid) -> StoreResult<u32> {
        self.read()?;
        let state = self.state.lock().await;
        Ok(state.boards.values().filter(|b| b.user_id == user_id).count() as u32)
    }

    async fn update_board(&self, board: &Board) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        match state.boards.get_mut(&board.id) {
            Some(existing) => {
                existing.title = board.title.clone();
                existing.description = board.description.clone();
                existing.updated_at = board.updated_at;
                Ok(())
            }
            None => Err(StoreError::not_found("board", board.id)),
        }
    }

    async fn delete_board(&self, id: Uuid) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        if state.boards.remove(&id).is_none() {
            return Err(StoreError::not_found("board", id));
        }
        state.columns.retain(|_, c| c.board_id != id);
        state.tasks.retain(|_, t| t.board_id != id);
        Ok(())
    }

    async fn list_columns(&self, board_id: Uuid) -> StoreResult<Vec<Column>> {
        self.read()?;
        let state = self.state.lock().await;
        let mut columns: Vec<Column> = state
            .columns
            .values()
            .filter(|c| c.board_id == board_id)
            .cloned()
            .collect();
        columns.sort_by_key(|c| c.position);
        Ok(columns)
    }

    async fn find_column(&self, id: Uuid) -> StoreResult<Option<Column>> {
        self.read()?;
        Ok(self.state.lock().await.columns.get(&id).cloned())
    }

    async fn insert_column(&self, column: &Column) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        if !state.boards.contains_key(&column.board_id) {
            return Err(StoreError::not_found("board", column.board_id));
        }
        state.columns.insert(column.id, column.clone());
        Ok(())
    }

    async fn rename_column(&self, id: Uuid, title: &str) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        match state.columns.get_mut(&id) {
            Some(column) => {
                column.title = title.to_string();
                Ok(())
            }
            None => Err(StoreError::not_found("column", id)),
        }
    }

    async fn delete_column(&self, id: Uuid, updates: &[ColumnPositionUpdate]) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        if !state.columns.contains_key(&id) {
            return Err(StoreError::not_found("column", id));
        }
        for update in updates {
            if !state.columns.contains_key(&update.column_id) {
                return Err(StoreError::not_found("column", update.column_id));
            }
        }
        state.columns.remove(&id);
        state.tasks.retain(|_, t| t.column_id != id);
        for update in updates {
            if let Some(column) = state.columns.get_mut(&update.column_id) {
                column.position = update.position;
            }
        }
        Ok(())
    }

    async fn apply_column_positions(&self, updates: &[ColumnPositionUpdate]) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        for update in updates {
            if !state.columns.contains_key(&update.column_id) {
                return Err(StoreError::not_found("column", update.column_id));
            }
        }
        for update in updates {
            if let Some(column) = state.columns.get_mut(&update.column_id) {
                column.position = update.position;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        self.read()?;
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn insert_task_at_top(&self, task: &Task) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        if !state.columns.contains_key(&task.column_id) {
            return Err(StoreError::not_found("column", task.column_id));
        }
        for sibling in state.tasks.values_mut() {
            if sibling.column_id == task.column_id && !sibling.archived {
                sibling.position += 1;
            }
        }
        let mut task = task.clone();
        task.position = 0;
        state.tasks.insert(task.id, task);
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&task.id) {
            Some(existing) => {
                existing.title = task.title.clone();
                existing.description = task.description.clone();
                existing.category = task.category.clone();
                existing.updated_at = task.updated_at;
                Ok(())
            }
            None => Err(StoreError::not_found("task", task.id)),
        }
    }

    async fn list_active_tasks(&self, column_ids: &[Uuid]) -> StoreResult<Vec<Task>> {
        self.read()?;
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| !t.archived && column_ids.contains(&t.column_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.column_id, t.position));
        Ok(tasks)
    }

    async fn list_board_tasks(&self, board_id: Uuid, archived: bool) -> StoreResult<Vec<Task>> {
        self.read()?;
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.board_id == board_id && t.archived == archived)
            .cloned()
            .collect();
        if archived {
            tasks.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        } else {
            tasks.sort_by_key(|t| (t.column_id, t.position));
        }
        Ok(tasks)
    }

    async fn apply_position_updates(&self, updates: &[PositionUpdate]) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        state.ensure_tasks_exist(updates.iter().map(|u| u.task_id))?;
        state.apply_positions(updates);
        Ok(())
    }

    async fn archive_tasks(
        &self,
        ids: &[Uuid],
        archived_at: DateTime<Utc>,
        updates: &[PositionUpdate],
    ) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        state.ensure_tasks_exist(ids.iter().copied())?;
        state.ensure_tasks_exist(updates.iter().map(|u| u.task_id))?;
        for id in ids {
            if let Some(task) = state.tasks.get_mut(id) {
                task.archived = true;
                task.archived_at = Some(archived_at);
                task.updated_at = archived_at;
            }
        }
        state.apply_positions(updates);
        Ok(())
    }

    async fn unarchive_task(&self, id: Uuid, position: i32) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&id) {
            Some(task) => {
                task.archived = false;
                task.archived_at = None;
                task.position = position;
                task.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::not_found("task", id)),
        }
    }

    async fn delete_task(&self, id: Uuid, updates: &[PositionUpdate]) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        state.ensure_tasks_exist(std::iter::once(id))?;
        state.ensure_tasks_exist(updates.iter().map(|u| u.task_id))?;
        state.tasks.remove(&id);
        state.apply_positions(updates);
        Ok(())
    }

    async fn count_active_tasks(&self, board_id: Uuid) -> StoreResult<u32> {
        self.read()?;
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.board_id == board_id && !t.archived)
            .count() as u32)
    }

    async fn count_archived_tasks(&self, user_id: Uuid) -> StoreResult<u32> {
        self.read()?;
        let state = self.state.lock().await;
        Ok(state.archived_of(user_id).len() as u32)
    }

    async fn list_stale_tasks(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Task>> {
        self.read()?;
        let state = self.state.lock().await;
        let boards = state.board_ids_of(user_id);
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| !t.archived && t.updated_at < cutoff && boards.contains(&t.board_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.updated_at);
        Ok(tasks)
    }

    async fn prune_archives_for_user(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
        keep_max: u32,
    ) -> StoreResult<u64> {
        self.write()?;
        let mut state = self.state.lock().await;
        let mut archived: Vec<(Uuid, Option<DateTime<Utc>>)> = state
            .archived_of(user_id)
            .into_iter()
            .map(|t| (t.id, t.archived_at))
            .collect();
        archived.sort_by_key(|(_, at)| *at);

        let mut doomed: Vec<Uuid> = archived
            .iter()
            .filter(|(_, at)| at.map_or(true, |at| at < cutoff))
            .map(|(id, _)| *id)
            .collect();
        let survivors: Vec<Uuid> = archived
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !doomed.contains(id))
            .collect();
        let excess = survivors.len().saturating_sub(keep_max as usize);
        doomed.extend(survivors.into_iter().take(excess));

        for id in &doomed {
            state.tasks.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn get_archive_stats(&self, user_id: Uuid) -> StoreResult<ArchiveStats> {
        self.read()?;
        let state = self.state.lock().await;
        let archived = state.archived_of(user_id);
        Ok(ArchiveStats {
            archived_count: archived.len() as u32,
            oldest_archived_at: archived.iter().filter_map(|t| t.archived_at).min(),
        })
    }

    async fn list_users_with_archived(&self) -> StoreResult<Vec<Uuid>> {
        self.read()?;
        let state = self.state.lock().await;
        let mut users: Vec<Uuid> = state
            .tasks
            .values()
            .filter(|t| t.archived)
            .filter_map(|t| state.boards.get(&t.board_id).map(|b| b.user_id))
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }
}

#[async_trait]
impl CategoryRepo for MemoryStore {
    async fn list_categories(&self, user_id: Uuid) -> StoreResult<Vec<Category>> {
        self.read()?;
        let state = self.state.lock().await;
        let mut categories: Vec<Category> = state
            .categories
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn upsert_category(&self, category: &Category) -> StoreResult<()> {
        self.write()?;
        self.state.lock().await.categories.insert(
            (category.user_id, category.name.clone()),
            category.clone(),
        );
        Ok(())
    }

    async fn delete_category(&self, user_id: Uuid, name: &str) -> StoreResult<bool> {
        self.write()?;
        let mut state = self.state.lock().await;
        Ok(state
            .categories
            .remove(&(user_id, name.to_string()))
            .is_some())
    }
}

#[async_trait]
impl ExportRepo for MemoryStore {
    async fn insert_export_token(&self, token: &ExportToken) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        if state.exports.values().any(|t| t.token_hash == token.token_hash) {
            return Err(StoreError::Conflict("duplicate export token".to_string()));
        }
        state.exports.insert(token.id, token.clone());
        Ok(())
    }

    async fn consume_export_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        self.read()?;
        let mut state = self.state.lock().await;
        let Some(token) = state.exports.values_mut().find(|t| t.token_hash == token_hash) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        let outcome = match token.status {
            ExportStatus::Used => ConsumeOutcome::AlreadyUsed,
            _ if token.is_expired(now) => ConsumeOutcome::Expired,
            ExportStatus::Pending => ConsumeOutcome::NotReady,
            ExportStatus::Ready => {
                self.write()?;
                token.status = ExportStatus::Used;
                token.used_at = Some(now);
                ConsumeOutcome::Consumed(token.clone())
            }
        };
        Ok(outcome)
    }

    async fn mark_export_ready(&self, id: Uuid, file_url: &str) -> StoreResult<()> {
        self.write()?;
        let mut state = self.state.lock().await;
        match state.exports.get_mut(&id) {
            Some(token) if token.status == ExportStatus::Pending => {
                token.status = ExportStatus::Ready;
                token.file_url = Some(file_url.to_string());
                Ok(())
            }
            Some(_) => Err(StoreError::Conflict(format!("export {} is not pending", id))),
            None => Err(StoreError::not_found("export token", id)),
        }
    }

    async fn list_pending_exports(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExportToken>> {
        self.read()?;
        let state = self.state.lock().await;
        let mut pending: Vec<ExportToken> = state
            .exports
            .values()
            .filter(|t| t.status == ExportStatus::Pending && !t.is_expired(now))
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        Ok(pending)
    }
}

#[async_trait]
impl AuditRepo for MemoryStore {
    async fn record_admin_action(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.audit_write()?;
        self.state.lock().await.admin_audit.push(entry.clone());
        Ok(())
    }

    async fn record_subscription_event(&self, event: &SubscriptionEvent) -> StoreResult<()> {
        self.audit_write()?;
        self.state
            .lock()
            .await
            .subscription_events
            .push(event.clone());
        Ok(())
    }

    async fn record_notification(&self, entry: &NotificationLogEntry) -> StoreResult<()> {
        self.audit_write()?;
        self.state.lock().await.notifications.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.read()
    }
}
