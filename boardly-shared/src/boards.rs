/// Board mutation service
///
/// Owns every board, column, task and category operation. Each call checks
/// ownership (foreign rows are reported as not found), consults the cap
/// engine where a create is involved, and persists renumbering through the
/// store's atomic batch methods.
///
/// A move's read and write are not serialized against concurrent moves from
/// other clients; the batch itself is atomic.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::caps::{CapEnforcer, CapError, CapType};
use crate::models::board::{Board, BoardDetail, Column, CreateBoard, UpdateBoard, DEFAULT_COLUMNS};
use crate::models::category::{is_valid_color, Category};
use crate::models::task::{NewTask, Task, UpdateTask};
use crate::ordering::{
    append_position, compact_after_removal, compact_columns_after_removal, plan_column_move,
    plan_move, MovePlan, OrderingError,
};
use crate::store::{Store, StoreError};

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_TASK_TITLE_LEN: usize = 500;
pub const MAX_CATEGORY_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Cap(#[from] CapError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type BoardResult<T> = Result<T, BoardError>;

fn clean_title(raw: &str, max: usize, what: &str) -> BoardResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(BoardError::Validation(format!("{} title is required", what)));
    }
    if title.chars().count() > max {
        return Err(BoardError::Validation(format!(
            "{} title must be at most {} characters",
            what, max
        )));
    }
    Ok(title.to_string())
}

fn clean_category(raw: &str) -> BoardResult<String> {
    let name = raw.trim();
    if name.chars().count() > MAX_CATEGORY_LEN {
        return Err(BoardError::Validation(format!(
            "category must be at most {} characters",
            MAX_CATEGORY_LEN
        )));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct BoardService {
    store: Arc<dyn Store>,
    caps: CapEnforcer,
}

impl BoardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let caps = CapEnforcer::new(store.clone());
        BoardService { store, caps }
    }

    pub fn caps(&self) -> &CapEnforcer {
        &self.caps
    }

    async fn owned_board(&self, user_id: Uuid, board_id: Uuid) -> BoardResult<Board> {
        match self.store.find_board(board_id).await? {
            Some(board) if board.user_id == user_id => Ok(board),
            _ => Err(BoardError::NotFound("board")),
        }
    }

    async fn owned_column(&self, user_id: Uuid, column_id: Uuid) -> BoardResult<Column> {
        let column = self
            .store
            .find_column(column_id)
            .await?
            .ok_or(BoardError::NotFound("column"))?;
        self.owned_board(user_id, column.board_id)
            .await
            .map_err(|_| BoardError::NotFound("column"))?;
        Ok(column)
    }

    async fn owned_task(&self, user_id: Uuid, task_id: Uuid) -> BoardResult<Task> {
        let task = self
            .store
            .find_task(task_id)
            .await?
            .ok_or(BoardError::NotFound("task"))?;
        self.owned_board(user_id, task.board_id)
            .await
            .map_err(|_| BoardError::NotFound("task"))?;
        Ok(task)
    }

    // ---- boards ----

    pub async fn list_boards(&self, user_id: Uuid) -> BoardResult<Vec<Board>> {
        Ok(self.store.list_boards(user_id).await?)
    }

    /// Creates a board with the default columns, subject to the board cap
    pub async fn create_board(&self, user_id: Uuid, input: CreateBoard) -> BoardResult<BoardDetail> {
        let title = clean_title(&input.title, MAX_TITLE_LEN, "board")?;
        CapEnforcer::enforce(CapType::Boards, self.caps.check_board_cap(user_id).await)?;

        let now = Utc::now();
        let board = Board {
            id: Uuid::new_v4(),
            user_id,
            title,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        let columns: Vec<Column> = DEFAULT_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, title)| Column {
                id: Uuid::new_v4(),
                board_id: board.id,
                title: title.to_string(),
                position: i as i32,
            })
            .collect();

        self.store.insert_board(&board, &columns).await?;
        info!(user_id = %user_id, board_id = %board.id, "Board created");

        Ok(BoardDetail::assemble(board, columns, Vec::new()))
    }

    pub async fn get_board(&self, user_id: Uuid, board_id: Uuid) -> BoardResult<BoardDetail> {
        let board = self.owned_board(user_id, board_id).await?;
        let columns = self.store.list_columns(board_id).await?;
        let tasks = self.store.list_board_tasks(board_id, false).await?;
        Ok(BoardDetail::assemble(board, columns, tasks))
    }

    pub async fn update_board(
        &self,
        user_id: Uuid,
        board_id: Uuid,
        input: UpdateBoard,
    ) -> BoardResult<Board> {
        self.caps.ensure_writable(user_id).await?;
        let mut board = self.owned_board(user_id, board_id).await?;
        if let Some(title) = input.title {
            board.title = clean_title(&title, MAX_TITLE_LEN, "board")?;
        }
        if let Some(description) = input.description {
            board.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        board.updated_at = Utc::now();
        self.store.update_board(&board).await?;
        Ok(board)
    }

    pub async fn delete_board(&self, user_id: Uuid, board_id: Uuid) -> BoardResult<()> {
        self.caps.ensure_writable(user_id).await?;
        self.owned_board(user_id, board_id).await?;
        self.store.delete_board(board_id).await?;
        info!(user_id = %user_id, board_id = %board_id, "Board deleted");
        Ok(())
    }

    /// Archived tasks of a board, most recently archived first
    pub async fn list_archived(&self, user_id: Uuid, board_id: Uuid) -> BoardResult<Vec<Task>> {
        self.owned_board(user_id, board_id).await?;
        Ok(self.store.list_board_tasks(board_id, true).await?)
    }

    // ---- columns ----

    /// Appends a column to the board
    pub async fn create_column(
        &self,
        user_id: Uuid,
        board_id: Uuid,
        title: &str,
    ) -> BoardResult<Column> {
        self.caps.ensure_writable(user_id).await?;
        self.owned_board(user_id, board_id).await?;
        let title = clean_title(title, MAX_TITLE_LEN, "column")?;
        let existing = self.store.list_columns(board_id).await?;

        let column = Column {
            id: Uuid::new_v4(),
            board_id,
            title,
            position: existing.len() as i32,
        };
        self.store.insert_column(&column).await?;
        Ok(column)
    }

    pub async fn rename_column(
        &self,
        user_id: Uuid,
        column_id: Uuid,
        title: &str,
    ) -> BoardResult<Column> {
        self.caps.ensure_writable(user_id).await?;
        let mut column = self.owned_column(user_id, column_id).await?;
        column.title = clean_title(title, MAX_TITLE_LEN, "column")?;
        self.store.rename_column(column_id, &column.title).await?;
        Ok(column)
    }

    /// Deletes a column with its tasks and closes the gap
    pub async fn delete_column(&self, user_id: Uuid, column_id: Uuid) -> BoardResult<()> {
        self.caps.ensure_writable(user_id).await?;
        let column = self.owned_column(user_id, column_id).await?;
        let columns = self.store.list_columns(column.board_id).await?;
        let updates = compact_columns_after_removal(&columns, column_id);
        self.store.delete_column(column_id, &updates).await?;
        Ok(())
    }

    /// Moves a column and returns the board's columns in their new order
    pub async fn move_column(
        &self,
        user_id: Uuid,
        column_id: Uuid,
        target_index: usize,
    ) -> BoardResult<Vec<Column>> {
        self.caps.ensure_writable(user_id).await?;
        let column = self.owned_column(user_id, column_id).await?;
        let columns = self.store.list_columns(column.board_id).await?;
        let updates = plan_column_move(&columns, column_id, target_index)?;
        if !updates.is_empty() {
            self.store.apply_column_positions(&updates).await?;
        }
        Ok(self.store.list_columns(column.board_id).await?)
    }

    // ---- tasks ----

    /// Inserts a task at the top of its column, subject to the task cap
    pub async fn create_task(
        &self,
        user_id: Uuid,
        board_id: Uuid,
        input: NewTask,
    ) -> BoardResult<Task> {
        self.owned_board(user_id, board_id).await?;
        let column = self.owned_column(user_id, input.column_id).await?;
        if column.board_id != board_id {
            return Err(BoardError::NotFound("column"));
        }
        let title = clean_title(&input.title, MAX_TASK_TITLE_LEN, "task")?;
        let category = clean_category(&input.category)?;

        CapEnforcer::enforce(
            CapType::ActiveTasks,
            self.caps.check_task_cap(board_id, user_id).await,
        )?;

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            board_id,
            column_id: column.id,
            title,
            description: input.description,
            category,
            position: 0,
            archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_task_at_top(&task).await?;
        debug!(board_id = %board_id, task_id = %task.id, "Task created");
        Ok(task)
    }

    pub async fn update_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        input: UpdateTask,
    ) -> BoardResult<Task> {
        self.caps.ensure_writable(user_id).await?;
        let mut task = self.owned_task(user_id, task_id).await?;
        if let Some(title) = input.title {
            task.title = clean_title(&title, MAX_TASK_TITLE_LEN, "task")?;
        }
        if let Some(description) = input.description {
            task.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(category) = input.category {
            task.category = clean_category(&category)?;
        }
        task.updated_at = Utc::now();
        self.store.update_task(&task).await?;
        Ok(task)
    }

    /// Moves a task; `target_index = None` appends to the target column
    ///
    /// Returns the plan that was applied. A move onto the task's own slot
    /// writes nothing.
    pub async fn move_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        target_column_id: Uuid,
        target_index: Option<usize>,
    ) -> BoardResult<MovePlan> {
        self.caps.ensure_writable(user_id).await?;
        let task = self.owned_task(user_id, task_id).await?;
        if task.archived {
            return Err(BoardError::Validation("archived tasks cannot be moved".to_string()));
        }
        let target = self.owned_column(user_id, target_column_id).await?;
        if target.board_id != task.board_id {
            return Err(BoardError::Validation(
                "tasks can only move between columns of the same board".to_string(),
            ));
        }

        let mut columns = vec![task.column_id];
        if target_column_id != task.column_id {
            columns.push(target_column_id);
        }
        let tasks = self.store.list_active_tasks(&columns).await?;
        let plan = plan_move(&tasks, task_id, target_column_id, target_index)?;

        if plan.is_noop() {
            debug!(task_id = %task_id, "Move is a no-op");
            return Ok(plan);
        }
        self.store.apply_position_updates(&plan.updates).await?;
        debug!(
            task_id = %task_id,
            target_column = %target_column_id,
            position = plan.target_position,
            rows = plan.updates.len(),
            "Task moved"
        );
        Ok(plan)
    }

    /// Soft-deletes a task, subject to the archive cap
    pub async fn archive_task(&self, user_id: Uuid, task_id: Uuid) -> BoardResult<Task> {
        let mut task = self.owned_task(user_id, task_id).await?;
        if task.archived {
            return Ok(task);
        }
        CapEnforcer::enforce(
            CapType::ArchivedTasks,
            self.caps.check_archive_cap(user_id).await,
        )?;

        let siblings = self.store.list_active_tasks(&[task.column_id]).await?;
        let updates = compact_after_removal(&siblings, &[task_id]);
        let now = Utc::now();
        self.store.archive_tasks(&[task_id], now, &updates).await?;

        task.archived = true;
        task.archived_at = Some(now);
        task.updated_at = now;
        Ok(task)
    }

    /// Restores a task to the end of its column, subject to the task cap
    pub async fn unarchive_task(&self, user_id: Uuid, task_id: Uuid) -> BoardResult<Task> {
        let mut task = self.owned_task(user_id, task_id).await?;
        if !task.archived {
            return Ok(task);
        }
        CapEnforcer::enforce(
            CapType::ActiveTasks,
            self.caps.check_task_cap(task.board_id, user_id).await,
        )?;

        let siblings = self.store.list_active_tasks(&[task.column_id]).await?;
        let position = append_position(&siblings, task.column_id);
        self.store.unarchive_task(task_id, position).await?;

        task.archived = false;
        task.archived_at = None;
        task.position = position;
        Ok(task)
    }

    /// Permanently deletes a task and compacts its column
    pub async fn delete_task(&self, user_id: Uuid, task_id: Uuid) -> BoardResult<()> {
        self.caps.ensure_writable(user_id).await?;
        let task = self.owned_task(user_id, task_id).await?;
        let updates = if task.archived {
            Vec::new()
        } else {
            let siblings = self.store.list_active_tasks(&[task.column_id]).await?;
            compact_after_removal(&siblings, &[task_id])
        };
        self.store.delete_task(task_id, &updates).await?;
        Ok(())
    }

    // ---- categories ----

    pub async fn list_categories(&self, user_id: Uuid) -> BoardResult<Vec<Category>> {
        Ok(self.store.list_categories(user_id).await?)
    }

    pub async fn upsert_category(
        &self,
        user_id: Uuid,
        name: &str,
        color: Option<String>,
    ) -> BoardResult<Category> {
        let name = clean_category(name)?;
        if name.is_empty() {
            return Err(BoardError::Validation("category name is required".to_string()));
        }
        if let Some(color) = &color {
            if !is_valid_color(color) {
                return Err(BoardError::Validation(format!("invalid color '{}'", color)));
            }
        }
        let category = Category::new(user_id, name, color);
        self.store.upsert_category(&category).await?;
        Ok(category)
    }

    pub async fn delete_category(&self, user_id: Uuid, name: &str) -> BoardResult<()> {
        if self.store.delete_category(user_id, name).await? {
            Ok(())
        } else {
            Err(BoardError::NotFound("category"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapReason;
    use crate::models::entitlement::EnforcementState;
    use crate::ordering::is_dense;
    use crate::store::memory::MemoryStore;
    use crate::store::{BoardRepo, EntitlementRepo, TaskRepo};

    struct Fixture {
        store: Arc<MemoryStore>,
        service: BoardService,
        user: Uuid,
        detail: BoardDetail,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let service = BoardService::new(store.clone());
        let user = Uuid::new_v4();
        let detail = service
            .create_board(
                user,
                CreateBoard {
                    title: "Launch".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();
        Fixture {
            store,
            service,
            user,
            detail,
        }
    }

    impl Fixture {
        fn column(&self, i: usize) -> Uuid {
            self.detail.columns[i].column.id
        }

        async fn add_task(&self, column: usize, title: &str) -> Task {
            self.service
                .create_task(
                    self.user,
                    self.detail.board.id,
                    NewTask {
                        column_id: self.column(column),
                        title: title.to_string(),
                        description: None,
                        category: String::new(),
                    },
                )
                .await
                .unwrap()
        }

        async fn titles(&self, column: usize) -> Vec<String> {
            self.store
                .list_active_tasks(&[self.column(column)])
                .await
                .unwrap()
                .into_iter()
                .map(|t| t.title)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_create_board_has_default_columns() {
        let f = fixture().await;
        let titles: Vec<_> = f
            .detail
            .columns
            .iter()
            .map(|c| c.column.title.as_str())
            .collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);
    }

    #[tokio::test]
    async fn test_second_board_on_free_plan_hits_cap() {
        let f = fixture().await;
        let err = f
            .service
            .create_board(
                f.user,
                CreateBoard {
                    title: "Second".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        match err {
            BoardError::Cap(CapError::Exceeded { current, limit, .. }) => {
                assert_eq!((current, limit), (1, 1));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_tasks_go_on_top() {
        let f = fixture().await;
        f.add_task(0, "a").await;
        f.add_task(0, "b").await;
        f.add_task(0, "c").await;
        assert_eq!(f.titles(0).await, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_move_last_to_first() {
        let f = fixture().await;
        for name in ["t2", "t1", "t0"] {
            f.add_task(0, name).await;
        }
        let last = f.store.list_active_tasks(&[f.column(0)]).await.unwrap()[2].clone();

        f.service
            .move_task(f.user, last.id, f.column(0), Some(0))
            .await
            .unwrap();

        assert_eq!(f.titles(0).await, vec!["t2", "t0", "t1"]);
    }

    #[tokio::test]
    async fn test_move_to_same_position_writes_nothing() {
        let f = fixture().await;
        let task = f.add_task(0, "only").await;
        let writes = f.store.write_count();

        let plan = f
            .service
            .move_task(f.user, task.id, f.column(0), Some(0))
            .await
            .unwrap();

        assert!(plan.is_noop());
        assert_eq!(f.store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_renumbered_siblings_stay_stale() {
        let f = fixture().await;
        for name in ["t2", "t1", "t0"] {
            f.add_task(0, name).await;
        }
        let tasks = f.store.list_active_tasks(&[f.column(0)]).await.unwrap();
        let mut dusty = tasks[1].clone();
        let touched = Utc::now() - chrono::Duration::days(30);
        dusty.updated_at = touched;
        f.store.update_task(&dusty).await.unwrap();

        f.service
            .move_task(f.user, tasks[2].id, f.column(0), Some(0))
            .await
            .unwrap();

        let after = f.store.find_task(dusty.id).await.unwrap().unwrap();
        assert_eq!(after.position, 2);
        assert_eq!(after.updated_at, touched);
        let stale = f
            .store
            .list_stale_tasks(f.user, Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, dusty.id);
    }

    #[tokio::test]
    async fn test_move_across_columns_keeps_density() {
        let f = fixture().await;
        for name in ["a", "b", "c"] {
            f.add_task(0, name).await;
        }
        f.add_task(1, "x").await;
        let middle = f.store.list_active_tasks(&[f.column(0)]).await.unwrap()[1].clone();

        f.service
            .move_task(f.user, middle.id, f.column(1), None)
            .await
            .unwrap();

        assert_eq!(f.titles(0).await, vec!["c", "a"]);
        assert_eq!(f.titles(1).await, vec!["x", "b"]);
        let all = f
            .store
            .list_board_tasks(f.detail.board.id, false)
            .await
            .unwrap();
        assert!(is_dense(&all));
    }

    #[tokio::test]
    async fn test_archive_middle_compacts() {
        let f = fixture().await;
        for name in ["c", "b", "a"] {
            f.add_task(0, name).await;
        }
        let middle = f.store.list_active_tasks(&[f.column(0)]).await.unwrap()[1].clone();

        let archived = f.service.archive_task(f.user, middle.id).await.unwrap();
        assert!(archived.archived);

        let positions: Vec<i32> = f
            .store
            .list_active_tasks(&[f.column(0)])
            .await
            .unwrap()
            .iter()
            .map(|t| t.position)
            .collect();
        assert_eq!(positions, vec![0, 1]);
        let listed = f
            .service
            .list_archived(f.user, f.detail.board.id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_unarchive_appends_to_end() {
        let f = fixture().await;
        let first = f.add_task(0, "first").await;
        f.add_task(0, "second").await;
        f.service.archive_task(f.user, first.id).await.unwrap();
        f.add_task(0, "third").await;

        let restored = f.service.unarchive_task(f.user, first.id).await.unwrap();

        assert_eq!(restored.position, 2);
        assert_eq!(f.titles(0).await, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_delete_task_compacts() {
        let f = fixture().await;
        let bottom = f.add_task(0, "bottom").await;
        let _middle = f.add_task(0, "middle").await;
        f.add_task(0, "top").await;
        f.service.delete_task(f.user, bottom.id).await.unwrap();
        let top = f.store.list_active_tasks(&[f.column(0)]).await.unwrap()[0].clone();
        f.service.delete_task(f.user, top.id).await.unwrap();

        let remaining = f.store.list_active_tasks(&[f.column(0)]).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].position, 0);
    }

    #[tokio::test]
    async fn test_foreign_task_is_not_found() {
        let f = fixture().await;
        let task = f.add_task(0, "mine").await;
        let err = f
            .service
            .archive_task(Uuid::new_v4(), task.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::NotFound("task")));
    }

    #[tokio::test]
    async fn test_read_only_blocks_mutations() {
        let f = fixture().await;
        let task = f.add_task(0, "frozen").await;
        let mut ent = f.store.find_entitlement(f.user).await.unwrap().unwrap();
        ent.enforcement_state = EnforcementState::Enforced;
        f.store.save_entitlement(&ent).await.unwrap();

        let err = f
            .service
            .move_task(f.user, task.id, f.column(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Cap(ref e) if e.reason() == CapReason::ReadOnly));
        assert!(f.service.get_board(f.user, f.detail.board.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_column_lifecycle() {
        let f = fixture().await;
        let backlog = f
            .service
            .create_column(f.user, f.detail.board.id, "Backlog")
            .await
            .unwrap();
        assert_eq!(backlog.position, 3);

        let columns = f.service.move_column(f.user, backlog.id, 0).await.unwrap();
        assert_eq!(columns[0].id, backlog.id);

        f.add_task(1, "gone with column").await;
        f.service.delete_column(f.user, f.column(0)).await.unwrap();
        let columns = f.store.list_columns(f.detail.board.id).await.unwrap();
        let positions: Vec<i32> = columns.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_category_validation() {
        let f = fixture().await;
        assert!(matches!(
            f.service
                .upsert_category(f.user, "bug", Some("red".to_string()))
                .await,
            Err(BoardError::Validation(_))
        ));
        f.service
            .upsert_category(f.user, "bug", Some("#ef4444".to_string()))
            .await
            .unwrap();
        assert_eq!(f.service.list_categories(f.user).await.unwrap().len(), 1);
        f.service.delete_category(f.user, "bug").await.unwrap();
        assert!(matches!(
            f.service.delete_category(f.user, "bug").await,
            Err(BoardError::NotFound("category"))
        ));
    }
}
