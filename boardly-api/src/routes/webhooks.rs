/// Billing webhooks
///
/// `POST /api/webhooks/paddle` verifies the `Paddle-Signature` header
/// against the raw body and records the event. Plan changes are still made
/// by admins; deliveries are stored for reconciliation only.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, Json};
use boardly_shared::{
    auth::webhook::{verify_signature, WebhookError, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER},
    models::audit::SubscriptionEvent,
};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event_type: String,
}

pub async fn paddle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<WebhookAck>)> {
    let secret = state
        .config
        .billing
        .paddle_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing webhooks are not configured".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing webhook signature".to_string()))?;

    verify_signature(signature, &body, secret, Utc::now(), DEFAULT_TOLERANCE_SECS).map_err(|e| {
        tracing::warn!(error = %e, "Rejected billing webhook");
        match e {
            WebhookError::Malformed => ApiError::BadRequest(e.to_string()),
            WebhookError::Stale | WebhookError::Mismatch => ApiError::Unauthorized(e.to_string()),
        }
    })?;

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {}", e)))?;
    let event_type = payload
        .get("event_type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let event = SubscriptionEvent::new(None, format!("paddle.{}", event_type), payload);
    state.store.record_subscription_event(&event).await?;

    tracing::info!(event_type = %event_type, event_id = %event.id, "Billing webhook recorded");
    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAck {
            received: true,
            event_type,
        }),
    ))
}
