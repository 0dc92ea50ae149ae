/// Authentication gates
///
/// - [`jwt_auth_layer`] validates the session token, provisions the profile
///   row on first sight and stores the auth context plus the [`Profile`] in
///   request extensions.
/// - [`require_admin`] runs after it and rejects non-admin profiles.
/// - [`cron_auth_layer`] guards scheduled job endpoints with the shared
///   cron secret, sent as `Authorization: Bearer <secret>`.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension,
};
use boardly_shared::{
    auth::{
        middleware::{authenticate, bearer_token},
        token::constant_time_compare,
    },
    models::profile::Profile,
};

pub async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(req.headers(), &state.config.auth.jwt_secret)?;

    let email = auth.email.as_deref().unwrap_or_default();
    let profile = state.store.ensure_profile(auth.user_id, email).await?;

    req.extensions_mut().insert(auth);
    req.extensions_mut().insert(profile);

    Ok(next.run(req).await)
}

pub async fn require_admin(
    Extension(profile): Extension<Profile>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !profile.is_admin {
        tracing::warn!(user_id = %profile.id, "Non-admin attempted an admin action");
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    Ok(next.run(req).await)
}

pub async fn cron_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = bearer_token(req.headers())
        .map_err(|_| ApiError::Unauthorized("Missing cron secret".to_string()))?;

    if !constant_time_compare(presented, &state.config.cron.secret) {
        tracing::warn!(path = %req.uri().path(), "Rejected cron request with bad secret");
        return Err(ApiError::Unauthorized("Invalid cron secret".to_string()));
    }

    Ok(next.run(req).await)
}

