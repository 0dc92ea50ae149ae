/// Category endpoints
///
/// Categories are per-user labels; tasks reference them by name.
///
/// - `GET /api/categories`
/// - `POST /api/categories` - Create or recolor (`{name, color?}`)
/// - `DELETE /api/categories/:name`

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use boardly_shared::{auth::middleware::AuthContext, models::category::Category};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// `#rrggbb`
    pub color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<Category>,
}

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<CategoriesResponse>> {
    let categories = state.boards.list_categories(auth.user_id).await?;
    Ok(Json(CategoriesResponse { categories }))
}

pub async fn upsert_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpsertCategoryRequest>,
) -> ApiResult<Json<Category>> {
    req.validate()?;
    let category = state
        .boards
        .upsert_category(auth.user_id, &req.name, req.color)
        .await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.boards.delete_category(auth.user_id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}
