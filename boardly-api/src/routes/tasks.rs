/// Task endpoints
///
/// - `POST /api/boards/:id/tasks` - Create at the top of a column (task cap)
/// - `PATCH /api/tasks/:id` - Edit title, description or category
/// - `DELETE /api/tasks/:id` - Delete permanently
/// - `POST /api/tasks/:id/move` - Drag-and-drop (`{targetColumnId, targetIndex?}`)
/// - `POST /api/tasks/:id/archive` - Archive (archive cap)
/// - `POST /api/tasks/:id/unarchive` - Restore to the end of its column (task cap)

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use boardly_shared::{
    auth::middleware::AuthContext,
    models::task::{NewTask, Task, UpdateTask},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub column_id: Uuid,

    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,

    pub description: Option<String>,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: Option<String>,

    pub description: Option<String>,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskRequest {
    pub target_column_id: Uuid,

    /// Omitted: append to the end of the target column
    pub target_index: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveTaskResponse {
    pub task_id: Uuid,
    pub column_id: Uuid,
    pub position: i32,

    /// Rows renumbered; zero for a move onto the current slot
    pub updated: usize,
}

/// Creates a task at position 0 of the column
///
/// # Errors
///
/// - `403 Forbidden` (`cap_exceeded`): board is at its active task cap
/// - `404 Not Found`: board or column is not the caller's
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(board_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    req.validate()?;

    let task = state
        .boards
        .create_task(
            auth.user_id,
            board_id,
            NewTask {
                column_id: req.column_id,
                title: req.title,
                description: req.description,
                category: req.category.unwrap_or_default(),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    req.validate()?;

    let task = state
        .boards
        .update_task(
            auth.user_id,
            task_id,
            UpdateTask {
                title: req.title,
                description: req.description,
                category: req.category,
            },
        )
        .await?;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.boards.delete_task(auth.user_id, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn move_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<MoveTaskRequest>,
) -> ApiResult<Json<MoveTaskResponse>> {
    let plan = state
        .boards
        .move_task(auth.user_id, task_id, req.target_column_id, req.target_index)
        .await?;

    Ok(Json(MoveTaskResponse {
        task_id: plan.task_id,
        column_id: plan.target_column,
        position: plan.target_position,
        updated: plan.updates.len(),
    }))
}

pub async fn archive_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = state.boards.archive_task(auth.user_id, task_id).await?;
    Ok(Json(task))
}

pub async fn unarchive_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = state.boards.unarchive_task(auth.user_id, task_id).await?;
    Ok(Json(task))
}
