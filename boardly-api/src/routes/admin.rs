/// Admin plan management
///
/// Both endpoints require a profile with `is_admin`; every change is
/// written to the admin audit log.
///
/// - `POST /api/admin/grant-pro` - `{userId}` or `{email}`
/// - `POST /api/admin/revoke-pro` - `{userId}`; 409 while the user owns
///   more than one board

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use boardly_shared::{
    auth::middleware::AuthContext, models::entitlement::Entitlement,
    subscription::GrantTarget,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GrantProRequest {
    pub user_id: Option<Uuid>,

    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
}

impl GrantProRequest {
    fn target(self) -> Option<GrantTarget> {
        match (self.user_id, self.email) {
            (Some(id), _) => Some(GrantTarget::UserId(id)),
            (None, Some(email)) => Some(GrantTarget::Email(email.trim().to_lowercase())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeProRequest {
    pub user_id: Uuid,
}

pub async fn grant_pro(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<GrantProRequest>,
) -> ApiResult<Json<Entitlement>> {
    req.validate()?;
    let target = req
        .target()
        .ok_or_else(|| ApiError::BadRequest("userId or email is required".to_string()))?;

    let ent = state
        .subscriptions
        .grant_pro(auth.user_id, target, Utc::now())
        .await?;
    Ok(Json(ent))
}

pub async fn revoke_pro(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RevokeProRequest>,
) -> ApiResult<Json<Entitlement>> {
    let ent = state.subscriptions.revoke_pro(auth.user_id, req.user_id).await?;
    Ok(Json(ent))
}
