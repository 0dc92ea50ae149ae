/// Task model
///
/// Tasks live in a column. Active (non-archived) tasks of a column carry
/// dense zero-based positions matching their visual order; archived tasks
/// keep their last position but are excluded from that bookkeeping.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     board_id UUID NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
///     column_id UUID NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
///     title VARCHAR(500) NOT NULL,
///     description TEXT,
///     category VARCHAR(100) NOT NULL DEFAULT '',
///     position INTEGER NOT NULL,
///     archived BOOLEAN NOT NULL DEFAULT FALSE,
///     archived_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task on a board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,

    /// Free-text label matched against the user's categories by name
    pub category: String,

    pub position: i32,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a task at the top of a board column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
}

/// Partial task update (content only; placement goes through moves)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.category.is_none()
    }
}

/// One row of a renumbering batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub task_id: Uuid,
    pub column_id: Uuid,
    pub position: i32,
}

impl Task {
    /// Builds a task with fresh ids for tests
    #[cfg(test)]
    pub(crate) fn fixture(board_id: Uuid, column_id: Uuid, position: i32) -> Self {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            board_id,
            column_id,
            title: format!("task {}", position),
            description: None,
            category: String::new(),
            position,
            archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_task_is_empty() {
        assert!(UpdateTask::default().is_empty());
        let update = UpdateTask {
            category: Some("bug".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_new_task_category_defaults_empty() {
        let json = serde_json::json!({
            "column_id": Uuid::nil(),
            "title": "Write docs",
            "description": null
        });
        let task: NewTask = serde_json::from_value(json).unwrap();
        assert_eq!(task.category, "");
    }
}
