//! # Boardly API Server
//!
//! Serves the Boardly JSON API. With `DATABASE_URL` set it runs migrations
//! and uses PostgreSQL; without it, it runs on the in-memory store for
//! local development.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p boardly-api
//! ```

use boardly_api::{
    app::{build_router, AppState},
    config::Config,
};
use boardly_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, PoolConfig},
    },
    notify::HttpNotifier,
    store::{memory::MemoryStore, postgres::PgStore, Store},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boardly_api=debug,boardly_shared=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Boardly API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database.url {
        Some(url) => {
            let pool = create_pool(PoolConfig {
                url: url.clone(),
                max_connections: config.database.max_connections,
                ..PoolConfig::default()
            })
            .await?;
            run_migrations(&pool).await?;
            tracing::info!("Connected to PostgreSQL");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier = Arc::new(HttpNotifier::new(
        config.notifications.resend_api_key.clone(),
        config.notifications.email_from.clone(),
    )?);
    if config.notifications.resend_api_key.is_none() {
        tracing::warn!("RESEND_API_KEY not set, email delivery is disabled");
    }

    let bind_address = config.bind_address();
    let state = AppState::new(store, notifier, config);

    // Drop idle rate limit windows so memory tracks active users only
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(limiter.window().max(std::time::Duration::from_secs(1)));
        loop {
            interval.tick().await;
            let dropped = limiter.sweep().await;
            if dropped > 0 {
                tracing::debug!(dropped = dropped, "Swept idle rate limit windows");
            }
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}
