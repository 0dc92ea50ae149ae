/// Optimistic client-side board state
///
/// A [`BoardSession`] holds a local snapshot of one board. Each
/// [`Command`] is applied to the snapshot first and then persisted through
/// [`BoardService`]. Applying a command yields a [`Compensation`]; if
/// persistence fails the compensation is replayed against the snapshot, or
/// the snapshot is reloaded when the command has no precise inverse or the
/// compensated state no longer has dense positions.
///
/// Only one move may be in flight per session. A second move issued while
/// the first is still persisting is rejected with [`MoveRejected::InFlight`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use boardly_shared::boards::BoardService;
/// use boardly_shared::session::{BoardSession, Command};
/// use boardly_shared::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example(user_id: Uuid, board_id: Uuid, task_id: Uuid, column_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let service = BoardService::new(Arc::new(MemoryStore::new()));
/// let session = BoardSession::open(service, user_id, board_id).await?;
/// session
///     .execute(Command::Move { task_id, target_column: column_id, target_index: Some(0) })
///     .await?;
/// # Ok(())
/// # }
/// ```

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::boards::{BoardError, BoardService};
use crate::models::board::{Board, BoardDetail, Column};
use crate::models::task::{NewTask, Task};
use crate::ordering::{apply_updates, compact_after_removal, is_dense, plan_move, OrderingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejected {
    #[error("another move is still in flight")]
    InFlight,
}

/// How the snapshot was brought back after a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Compensated,
    Reloaded,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] MoveRejected),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error("task {0} is not on this board")]
    UnknownTask(Uuid),

    #[error("write failed and snapshot was {recovery:?}: {source}")]
    Persist {
        #[source]
        source: BoardError,
        recovery: Recovery,
    },

    #[error("failed to reload board: {0}")]
    Reload(#[source] BoardError),
}

/// User intent against the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move {
        task_id: Uuid,
        target_column: Uuid,
        target_index: Option<usize>,
    },
    Archive {
        task_id: Uuid,
    },
    Delete {
        task_id: Uuid,
    },
    Create {
        column_id: Uuid,
        title: String,
        category: String,
    },
}

/// Undo step for an optimistically applied command
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Put these rows back exactly as they were
    Restore(Vec<Task>),

    /// Drop a placeholder inserted for a pending create and close the gap
    RemovePlaceholder(Uuid),

    /// No precise inverse exists
    Reload,
}

#[derive(Debug, Clone)]
struct Snapshot {
    board: Board,
    columns: Vec<Column>,
    tasks: Vec<Task>,
}

impl Snapshot {
    fn from_detail(detail: BoardDetail) -> Self {
        let mut columns = Vec::with_capacity(detail.columns.len());
        let mut tasks = Vec::new();
        for entry in detail.columns {
            tasks.extend(entry.tasks);
            columns.push(entry.column);
        }
        Snapshot {
            board: detail.board,
            columns,
            tasks,
        }
    }

    fn detail(&self) -> BoardDetail {
        BoardDetail::assemble(self.board.clone(), self.columns.clone(), self.tasks.clone())
    }

    fn task(&self, task_id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    fn column_rows(&self, column_id: Uuid) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.column_id == column_id)
            .cloned()
            .collect()
    }

    fn remove_and_compact(&mut self, task_id: Uuid, column_id: Uuid) {
        let updates = compact_after_removal(&self.column_rows(column_id), &[task_id]);
        self.tasks.retain(|t| t.id != task_id);
        apply_updates(&mut self.tasks, &updates);
    }

    fn restore(&mut self, rows: &[Task]) {
        self.tasks.retain(|t| !rows.iter().any(|r| r.id == t.id));
        self.tasks.extend(rows.iter().cloned());
    }
}

/// Releases the in-flight flag on drop
pub struct MoveGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for MoveGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct BoardSession {
    service: BoardService,
    user_id: Uuid,
    board_id: Uuid,
    snapshot: Mutex<Snapshot>,
    move_in_flight: AtomicBool,
}

impl BoardSession {
    pub async fn open(
        service: BoardService,
        user_id: Uuid,
        board_id: Uuid,
    ) -> Result<Self, BoardError> {
        let detail = service.get_board(user_id, board_id).await?;
        Ok(BoardSession {
            service,
            user_id,
            board_id,
            snapshot: Mutex::new(Snapshot::from_detail(detail)),
            move_in_flight: AtomicBool::new(false),
        })
    }

    /// Current local view of the board
    pub async fn detail(&self) -> BoardDetail {
        self.snapshot.lock().await.detail()
    }

    /// Claims the single move slot of this session
    pub fn try_begin_move(&self) -> Result<MoveGuard<'_>, MoveRejected> {
        self.move_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| MoveRejected::InFlight)?;
        Ok(MoveGuard {
            flag: &self.move_in_flight,
        })
    }

    /// Replaces the snapshot with the persisted board
    pub async fn reload(&self) -> Result<(), BoardError> {
        let detail = self.service.get_board(self.user_id, self.board_id).await?;
        *self.snapshot.lock().await = Snapshot::from_detail(detail);
        debug!(board_id = %self.board_id, "Session reloaded");
        Ok(())
    }

    /// Applies a command to the snapshot and returns its compensation
    pub async fn apply_local(&self, command: &Command) -> Result<Compensation, SessionError> {
        let mut snap = self.snapshot.lock().await;
        match command {
            Command::Move {
                task_id,
                target_column,
                target_index,
            } => {
                let plan = plan_move(&snap.tasks, *task_id, *target_column, *target_index)?;
                let previous: Vec<Task> = snap
                    .tasks
                    .iter()
                    .filter(|t| plan.updates.iter().any(|u| u.task_id == t.id))
                    .cloned()
                    .collect();
                apply_updates(&mut snap.tasks, &plan.updates);
                Ok(Compensation::Restore(previous))
            }
            Command::Archive { task_id } => {
                let column_id = snap
                    .task(*task_id)
                    .ok_or(SessionError::UnknownTask(*task_id))?
                    .column_id;
                let previous = snap.column_rows(column_id);
                snap.remove_and_compact(*task_id, column_id);
                Ok(Compensation::Restore(previous))
            }
            Command::Delete { task_id } => {
                let column_id = snap
                    .task(*task_id)
                    .ok_or(SessionError::UnknownTask(*task_id))?
                    .column_id;
                snap.remove_and_compact(*task_id, column_id);
                Ok(Compensation::Reload)
            }
            Command::Create {
                column_id,
                title,
                category,
            } => {
                let now = Utc::now();
                let placeholder = Task {
                    id: Uuid::new_v4(),
                    board_id: self.board_id,
                    column_id: *column_id,
                    title: title.clone(),
                    description: None,
                    category: category.clone(),
                    position: 0,
                    archived: false,
                    archived_at: None,
                    created_at: now,
                    updated_at: now,
                };
                for task in snap.tasks.iter_mut().filter(|t| t.column_id == *column_id) {
                    task.position += 1;
                }
                let id = placeholder.id;
                snap.tasks.push(placeholder);
                Ok(Compensation::RemovePlaceholder(id))
            }
        }
    }

    /// Applies a compensation; falls back to a reload when it cannot be
    /// applied precisely
    async fn compensate(&self, compensation: Compensation) -> Result<Recovery, SessionError> {
        {
            let mut snap = self.snapshot.lock().await;
            match &compensation {
                Compensation::Restore(rows) => snap.restore(rows),
                Compensation::RemovePlaceholder(id) => {
                    if let Some(column_id) = snap.task(*id).map(|t| t.column_id) {
                        snap.remove_and_compact(*id, column_id);
                    }
                }
                Compensation::Reload => {}
            }
            if compensation != Compensation::Reload && is_dense(&snap.tasks) {
                return Ok(Recovery::Compensated);
            }
        }
        self.reload().await.map_err(SessionError::Reload)?;
        Ok(Recovery::Reloaded)
    }

    async fn persist(&self, command: &Command) -> Result<Option<Task>, BoardError> {
        match command {
            Command::Move {
                task_id,
                target_column,
                target_index,
            } => self
                .service
                .move_task(self.user_id, *task_id, *target_column, *target_index)
                .await
                .map(|_| None),
            Command::Archive { task_id } => self
                .service
                .archive_task(self.user_id, *task_id)
                .await
                .map(|_| None),
            Command::Delete { task_id } => self
                .service
                .delete_task(self.user_id, *task_id)
                .await
                .map(|_| None),
            Command::Create {
                column_id,
                title,
                category,
            } => self
                .service
                .create_task(
                    self.user_id,
                    self.board_id,
                    NewTask {
                        column_id: *column_id,
                        title: title.clone(),
                        description: None,
                        category: category.clone(),
                    },
                )
                .await
                .map(Some),
        }
    }

    /// Applies a command optimistically and persists it
    pub async fn execute(&self, command: Command) -> Result<(), SessionError> {
        let _guard = match command {
            Command::Move { .. } => Some(self.try_begin_move()?),
            _ => None,
        };

        let compensation = self.apply_local(&command).await?;
        if matches!(&compensation, Compensation::Restore(rows) if rows.is_empty()) {
            return Ok(());
        }

        match self.persist(&command).await {
            Ok(created) => {
                if let (Some(task), Compensation::RemovePlaceholder(placeholder)) =
                    (created, &compensation)
                {
                    let mut snap = self.snapshot.lock().await;
                    if let Some(local) = snap.tasks.iter_mut().find(|t| t.id == *placeholder) {
                        *local = Task {
                            position: local.position,
                            ..task
                        };
                    }
                }
                Ok(())
            }
            Err(source) => {
                warn!(
                    board_id = %self.board_id,
                    error = %source,
                    "Persisting board command failed, compensating"
                );
                let recovery = self.compensate(compensation).await?;
                Err(SessionError::Persist { source, recovery })
            }
        }
    }
}
