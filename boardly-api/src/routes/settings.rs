/// Notification settings
///
/// - `GET/POST /api/email/settings` - `{emailNotifications}`
/// - `GET/POST /api/slack/settings` - `{webhookUrl?, staleCardAlerts?}`
///
/// Connecting a Slack webhook posts a test message first; a webhook that
/// does not accept it is not saved. An empty `webhookUrl` disconnects.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use boardly_shared::{
    models::profile::{is_slack_webhook_url, EmailSettings, Profile, SlackSettings},
    notify::{send_logged, Message},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmailSettingsRequest {
    pub email_notifications: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSlackSettingsRequest {
    pub webhook_url: Option<String>,
    pub stale_card_alerts: Option<bool>,
}

const SLACK_TEST_MESSAGE: &str = "Boardly is connected. You'll get a daily note here about cards that haven't moved in a week.";

pub async fn get_email_settings(Extension(profile): Extension<Profile>) -> Json<EmailSettings> {
    Json(EmailSettings::from(&profile))
}

pub async fn update_email_settings(
    State(state): State<AppState>,
    Extension(mut profile): Extension<Profile>,
    Json(req): Json<UpdateEmailSettingsRequest>,
) -> ApiResult<Json<EmailSettings>> {
    profile.email_notifications = req.email_notifications;
    state.store.save_profile(&profile).await?;

    tracing::info!(
        user_id = %profile.id,
        email_notifications = profile.email_notifications,
        "Email settings updated"
    );
    Ok(Json(EmailSettings::from(&profile)))
}

pub async fn get_slack_settings(Extension(profile): Extension<Profile>) -> Json<SlackSettings> {
    Json(SlackSettings::from(&profile))
}

pub async fn update_slack_settings(
    State(state): State<AppState>,
    Extension(mut profile): Extension<Profile>,
    Json(req): Json<UpdateSlackSettingsRequest>,
) -> ApiResult<Json<SlackSettings>> {
    match req.webhook_url.as_deref().map(str::trim) {
        None => {}
        Some("") => {
            profile.slack_webhook_url = None;
            profile.stale_card_alerts = false;
        }
        Some(url) => {
            if !is_slack_webhook_url(url) {
                return Err(ApiError::BadRequest(
                    "webhookUrl must be a Slack incoming webhook URL".to_string(),
                ));
            }
            let test = Message::Slack {
                webhook_url: url.to_string(),
                text: SLACK_TEST_MESSAGE.to_string(),
            };
            send_logged(&state.store, state.notifier.as_ref(), profile.id, "slack_connected", &test)
                .await
                .map_err(|e| ApiError::BadRequest(format!("Slack rejected the test message: {}", e)))?;
            profile.slack_webhook_url = Some(url.to_string());
        }
    }

    if let Some(alerts) = req.stale_card_alerts {
        if alerts && profile.slack_webhook_url.is_none() {
            return Err(ApiError::BadRequest(
                "Connect a Slack webhook before enabling stale card alerts".to_string(),
            ));
        }
        profile.stale_card_alerts = alerts;
    }

    state.store.save_profile(&profile).await?;
    tracing::info!(
        user_id = %profile.id,
        connected = profile.slack_webhook_url.is_some(),
        stale_card_alerts = profile.stale_card_alerts,
        "Slack settings updated"
    );
    Ok(Json(SlackSettings::from(&profile)))
}
