/// Scheduled job triggers
///
/// Guarded by the cron secret. Each handler runs one maintenance job
/// synchronously and returns its report; the worker runs the same jobs on
/// its own schedule, and every job is safe to run twice.
///
/// - `POST /api/slack/check-old-cards`
/// - `POST /api/cron/prune-archives`
/// - `POST /api/cron/enforce-grace`
/// - `POST /api/cron/prepare-exports`

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use boardly_shared::jobs::{GraceReport, PruneReport, StaleCardReport};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PrepareExportsResponse {
    pub prepared: usize,
}

pub async fn check_old_cards(State(state): State<AppState>) -> ApiResult<Json<StaleCardReport>> {
    let report = state.jobs.check_old_cards(Utc::now()).await?;
    Ok(Json(report))
}

pub async fn prune_archives(State(state): State<AppState>) -> ApiResult<Json<PruneReport>> {
    let report = state.jobs.prune_archives(Utc::now()).await?;
    Ok(Json(report))
}

/// Applies due cancellations, then locks or restores expired grace periods
pub async fn enforce_grace(State(state): State<AppState>) -> ApiResult<Json<GraceReport>> {
    let report = state.jobs.enforce_grace(Utc::now()).await?;
    tracing::info!(
        cancellations = report.cancellations_applied,
        enforced = report.enforced,
        restored = report.restored,
        "Grace enforcement triggered over HTTP"
    );
    Ok(Json(report))
}

pub async fn prepare_exports(
    State(state): State<AppState>,
) -> ApiResult<Json<PrepareExportsResponse>> {
    let prepared = state.jobs.prepare_exports(Utc::now()).await?;
    Ok(Json(PrepareExportsResponse { prepared }))
}
