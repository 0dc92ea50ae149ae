/// Board endpoints
///
/// - `GET /api/boards` - List the caller's boards
/// - `POST /api/boards` - Create a board (board cap)
/// - `GET /api/boards/:id` - Board with columns and active tasks
/// - `PATCH /api/boards/:id` - Rename or re-describe
/// - `DELETE /api/boards/:id` - Delete with all columns and tasks
/// - `GET /api/boards/:id/archived` - Archived tasks of a board

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use boardly_shared::{
    auth::middleware::AuthContext,
    models::{
        board::{Board, BoardDetail, CreateBoard, UpdateBoard},
        task::Task,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBoardRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBoardRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListBoardsResponse {
    pub boards: Vec<Board>,
}

#[derive(Debug, Serialize)]
pub struct ArchivedTasksResponse {
    pub tasks: Vec<Task>,
}

pub async fn list_boards(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ListBoardsResponse>> {
    let boards = state.boards.list_boards(auth.user_id).await?;
    Ok(Json(ListBoardsResponse { boards }))
}

/// Creates a board with the default columns
///
/// # Errors
///
/// - `403 Forbidden` (`cap_exceeded`): board cap reached or account read-only
/// - `422 Unprocessable Entity`: validation failed
pub async fn create_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateBoardRequest>,
) -> ApiResult<(StatusCode, Json<BoardDetail>)> {
    req.validate()?;

    let detail = state
        .boards
        .create_board(
            auth.user_id,
            CreateBoard {
                title: req.title,
                description: req.description,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(board_id): Path<Uuid>,
) -> ApiResult<Json<BoardDetail>> {
    let detail = state.boards.get_board(auth.user_id, board_id).await?;
    Ok(Json(detail))
}

pub async fn update_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(board_id): Path<Uuid>,
    Json(req): Json<UpdateBoardRequest>,
) -> ApiResult<Json<Board>> {
    req.validate()?;

    let board = state
        .boards
        .update_board(
            auth.user_id,
            board_id,
            UpdateBoard {
                title: req.title,
                description: req.description,
            },
        )
        .await?;

    Ok(Json(board))
}

pub async fn delete_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(board_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.boards.delete_board(auth.user_id, board_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_archived(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(board_id): Path<Uuid>,
) -> ApiResult<Json<ArchivedTasksResponse>> {
    let tasks = state.boards.list_archived(auth.user_id, board_id).await?;
    Ok(Json(ArchivedTasksResponse { tasks }))
}
