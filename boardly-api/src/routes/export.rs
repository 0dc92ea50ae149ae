/// Export endpoints
///
/// - `POST /api/export/request` - `{type: "csv" | "json", boardId?}`
/// - `GET /api/export/download/:token` - One-time download, no session needed
///
/// A single-board export is ready immediately (`200`). A full-account
/// export is queued for the worker (`202`); its link starts working once
/// the worker has prepared it.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use boardly_shared::{
    auth::middleware::AuthContext,
    export::ExportTicket,
    models::export_token::{ExportStatus, ExportType},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(rename = "type")]
    pub export_type: ExportType,
    pub board_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    #[serde(flatten)]
    pub ticket: ExportTicket,

    /// Relative download path; the token is only shown once
    pub download_url: String,
}

pub async fn request_export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ExportRequest>,
) -> ApiResult<(StatusCode, Json<ExportResponse>)> {
    let ticket = state
        .exports
        .request(auth.user_id, req.export_type, req.board_id, Utc::now())
        .await?;

    let status = match ticket.status {
        ExportStatus::Ready => StatusCode::OK,
        _ => StatusCode::ACCEPTED,
    };
    let download_url = format!("/api/export/download/{}", ticket.token);

    Ok((status, Json(ExportResponse { ticket, download_url })))
}

/// Streams the export file and spends the token
///
/// # Errors
///
/// - `404 Not Found`: unknown token
/// - `409 Conflict`: still being prepared
/// - `410 Gone`: already used or expired
pub async fn download_export(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Response> {
    let file = state.exports.download(&token, Utc::now()).await?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(file.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store, private")),
        ],
        file.body,
    )
        .into_response())
}
