/// Board and column models
///
/// # Schema
///
/// ```sql
/// CREATE TABLE boards (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL,
///     title VARCHAR(255) NOT NULL,
///     description TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE columns (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     board_id UUID NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
///     title VARCHAR(255) NOT NULL,
///     position INTEGER NOT NULL
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::Task;

/// Columns every new board starts with, in display order
pub const DEFAULT_COLUMNS: [&str; 3] = ["To Do", "In Progress", "Done"];

/// Board owned by a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Board {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column within a board; `position` is dense and zero-based
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Column {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub position: i32,
}

/// Input for creating a board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBoard {
    pub title: String,
    pub description: Option<String>,
}

/// Partial board update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBoard {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A column together with its active tasks in position order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnWithTasks {
    #[serde(flatten)]
    pub column: Column,
    pub tasks: Vec<Task>,
}

/// Full board view as rendered by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDetail {
    pub board: Board,
    pub columns: Vec<ColumnWithTasks>,
}

impl BoardDetail {
    /// Assembles a detail view, sorting columns and tasks by position
    ///
    /// Archived tasks and tasks of unknown columns are dropped.
    pub fn assemble(board: Board, mut columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        columns.sort_by_key(|c| c.position);
        let mut columns: Vec<ColumnWithTasks> = columns
            .into_iter()
            .map(|column| ColumnWithTasks {
                column,
                tasks: Vec::new(),
            })
            .collect();

        for task in tasks.into_iter().filter(|t| !t.archived) {
            if let Some(col) = columns.iter_mut().find(|c| c.column.id == task.column_id) {
                col.tasks.push(task);
            }
        }
        for col in &mut columns {
            col.tasks.sort_by_key(|t| t.position);
        }

        BoardDetail { board, columns }
    }

    /// Finds the column holding a task and the task's index in it
    pub fn locate_task(&self, task_id: Uuid) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, col)| {
            col.tasks
                .iter()
                .position(|t| t.id == task_id)
                .map(|ti| (ci, ti))
        })
    }

    /// Index of a column in the view
    pub fn column_index(&self, column_id: Uuid) -> Option<usize> {
        self.columns.iter().position(|c| c.column.id == column_id)
    }

    /// Number of active tasks on the board
    pub fn active_task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }
}
