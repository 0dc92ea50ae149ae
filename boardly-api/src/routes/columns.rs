/// Column endpoints
///
/// - `POST /api/boards/:id/columns` - Append a column
/// - `PATCH /api/columns/:id` - Rename
/// - `DELETE /api/columns/:id` - Delete with its tasks
/// - `POST /api/columns/:id/move` - Reorder (`{targetIndex}`)

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use boardly_shared::{auth::middleware::AuthContext, models::board::Column};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ColumnTitleRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveColumnRequest {
    pub target_index: usize,
}

#[derive(Debug, Serialize)]
pub struct ColumnsResponse {
    pub columns: Vec<Column>,
}

pub async fn create_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(board_id): Path<Uuid>,
    Json(req): Json<ColumnTitleRequest>,
) -> ApiResult<(StatusCode, Json<Column>)> {
    req.validate()?;
    let column = state
        .boards
        .create_column(auth.user_id, board_id, &req.title)
        .await?;
    Ok((StatusCode::CREATED, Json(column)))
}

pub async fn rename_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(column_id): Path<Uuid>,
    Json(req): Json<ColumnTitleRequest>,
) -> ApiResult<Json<Column>> {
    req.validate()?;
    let column = state
        .boards
        .rename_column(auth.user_id, column_id, &req.title)
        .await?;
    Ok(Json(column))
}

pub async fn delete_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(column_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.boards.delete_column(auth.user_id, column_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns every column of the board in its new order
pub async fn move_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(column_id): Path<Uuid>,
    Json(req): Json<MoveColumnRequest>,
) -> ApiResult<Json<ColumnsResponse>> {
    let columns = state
        .boards
        .move_column(auth.user_id, column_id, req.target_index)
        .await?;
    Ok(Json(ColumnsResponse { columns }))
}
