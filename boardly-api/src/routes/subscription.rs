/// Usage and subscription endpoints
///
/// - `GET /api/usage` - Counts, plan limits and subscription state
/// - `POST /api/subscription/cancel` - `{cancelNow}`
/// - `POST /api/subscription/undo-cancel`
/// - `GET /api/subscription/over-limit?primaryBoardId=` - Dry run of the wizard
/// - `POST /api/subscription/resolve-over-limit` - `{primaryBoardId}`

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use boardly_shared::{
    auth::middleware::AuthContext, caps::UsageStats, models::entitlement::Entitlement,
    over_limit::OverLimitPlan,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// End Pro now instead of at the period end
    #[serde(default)]
    pub cancel_now: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverLimitRequest {
    pub primary_board_id: Uuid,
}

/// Usage stats; provisions the free entitlement on first call
pub async fn usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UsageStats>> {
    let stats = state.boards.caps().usage_stats(auth.user_id).await?;
    Ok(Json(stats))
}

/// Cancels the caller's Pro subscription
///
/// # Errors
///
/// - `400 Bad Request`: not on Pro, not eligible for an immediate cancel,
///   no billing period, or already scheduled
pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    body: Option<Json<CancelRequest>>,
) -> ApiResult<Json<Entitlement>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let ent = state
        .subscriptions
        .cancel(auth.user_id, req.cancel_now, Utc::now())
        .await?;
    Ok(Json(ent))
}

pub async fn undo_cancel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Entitlement>> {
    let ent = state.subscriptions.undo_cancel(auth.user_id, Utc::now()).await?;
    Ok(Json(ent))
}

pub async fn preview_over_limit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<OverLimitRequest>,
) -> ApiResult<Json<OverLimitPlan>> {
    let plan = state
        .over_limit
        .preview(auth.user_id, query.primary_board_id)
        .await?;
    Ok(Json(plan))
}

/// Keeps the primary board, deletes the rest and archives excess tasks
pub async fn resolve_over_limit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<OverLimitRequest>,
) -> ApiResult<Json<OverLimitPlan>> {
    let plan = state
        .over_limit
        .resolve(auth.user_id, req.primary_board_id, Utc::now())
        .await?;
    Ok(Json(plan))
}
