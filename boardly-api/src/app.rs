/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use boardly_api::{app::{build_router, AppState}, config::Config};
/// use boardly_shared::{notify::RecordingNotifier, store::memory::MemoryStore};
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(RecordingNotifier::new()),
///     config,
/// );
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        auth::{cron_auth_layer, jwt_auth_layer, require_admin},
        rate_limit::{rate_limit_layer, RateLimiter},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Router,
};
use boardly_shared::{
    boards::BoardService, export::ExportService, jobs::MaintenanceJobs, notify::Notifier,
    over_limit::OverLimitService, store::Store, subscription::SubscriptionService,
};
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request via Axum's `State` extractor; every field is
/// reference counted.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub boards: BoardService,
    pub subscriptions: SubscriptionService,
    pub over_limit: OverLimitService,
    pub exports: ExportService,
    pub jobs: MaintenanceJobs,
    pub notifier: Arc<dyn Notifier>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.requests_per_window,
            Duration::from_secs(config.rate_limit.window_secs),
        ));

        Self {
            boards: BoardService::new(store.clone()),
            subscriptions: SubscriptionService::new(store.clone()),
            over_limit: OverLimitService::new(store.clone()),
            exports: ExportService::new(store.clone()),
            jobs: MaintenanceJobs::new(
                store.clone(),
                notifier.clone(),
                config.notifications.app_url.clone(),
            ),
            store,
            notifier,
            rate_limiter,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                         # public
/// └── /api/
///     ├── boards, columns, tasks,     # session auth + rate limit
///     │   categories, usage,
///     │   subscription, settings,
///     │   export/request
///     ├── admin/                      # session auth + admin flag
///     ├── export/download/:token      # token is the credential
///     ├── cron/, slack/check-old-cards  # cron secret
///     └── webhooks/paddle             # signature verified in handler
/// ```
///
/// # Middleware Stack
///
/// Outermost first: security headers, CORS, tracing, then per-group
/// authentication and rate limiting.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Session-authenticated, rate-limited routes. The last layer added runs
    // first, so auth populates the context before the limiter reads it.
    let user_routes = Router::new()
        .route(
            "/boards",
            get(routes::boards::list_boards).post(routes::boards::create_board),
        )
        .route(
            "/boards/:id",
            get(routes::boards::get_board)
                .patch(routes::boards::update_board)
                .delete(routes::boards::delete_board),
        )
        .route("/boards/:id/archived", get(routes::boards::list_archived))
        .route("/boards/:id/columns", post(routes::columns::create_column))
        .route("/boards/:id/tasks", post(routes::tasks::create_task))
        .route(
            "/columns/:id",
            patch(routes::columns::rename_column).delete(routes::columns::delete_column),
        )
        .route("/columns/:id/move", post(routes::columns::move_column))
        .route(
            "/tasks/:id",
            patch(routes::tasks::update_task).delete(routes::tasks::delete_task),
        )
        .route("/tasks/:id/move", post(routes::tasks::move_task))
        .route("/tasks/:id/archive", post(routes::tasks::archive_task))
        .route("/tasks/:id/unarchive", post(routes::tasks::unarchive_task))
        .route(
            "/categories",
            get(routes::categories::list_categories).post(routes::categories::upsert_category),
        )
        .route("/categories/:name", delete(routes::categories::delete_category))
        .route("/usage", get(routes::subscription::usage))
        .route("/subscription/cancel", post(routes::subscription::cancel))
        .route("/subscription/undo-cancel", post(routes::subscription::undo_cancel))
        .route("/subscription/over-limit", get(routes::subscription::preview_over_limit))
        .route(
            "/subscription/resolve-over-limit",
            post(routes::subscription::resolve_over_limit),
        )
        .route(
            "/email/settings",
            get(routes::settings::get_email_settings).post(routes::settings::update_email_settings),
        )
        .route(
            "/slack/settings",
            get(routes::settings::get_slack_settings).post(routes::settings::update_slack_settings),
        )
        .route("/export/request", post(routes::export::request_export))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_layer))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let admin_routes = Router::new()
        .route("/admin/grant-pro", post(routes::admin::grant_pro))
        .route("/admin/revoke-pro", post(routes::admin::revoke_pro))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let cron_routes = Router::new()
        .route("/slack/check-old-cards", post(routes::cron::check_old_cards))
        .route("/cron/prune-archives", post(routes::cron::prune_archives))
        .route("/cron/enforce-grace", post(routes::cron::enforce_grace))
        .route("/cron/prepare-exports", post(routes::cron::prepare_exports))
        .route_layer(from_fn_with_state(state.clone(), cron_auth_layer));

    let public_api_routes = Router::new()
        .route("/export/download/:token", get(routes::export::download_export))
        .route("/webhooks/paddle", post(routes::webhooks::paddle_webhook));

    let api_routes = Router::new()
        .merge(user_routes)
        .merge(admin_routes)
        .merge(cron_routes)
        .merge(public_api_routes);

    let cors = if state.config.allows_any_origin() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
