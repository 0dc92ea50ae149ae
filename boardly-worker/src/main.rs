//! # Boardly Worker
//!
//! Background job runner for Boardly:
//! - Prunes archived tasks past retention or over the archive cap
//! - Sends daily Slack digests of stale cards
//! - Applies due cancellations and closes expired courtesy windows
//! - Prepares queued account exports
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p boardly-worker
//! ```

use boardly_shared::{
    db::pool::{create_pool, PoolConfig},
    jobs::MaintenanceJobs,
    notify::HttpNotifier,
    store::{memory::MemoryStore, postgres::PgStore, Store},
};
use boardly_worker::{config::WorkerConfig, scheduler::Scheduler};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boardly_worker=debug,boardly_shared=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Boardly Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    // Migrations are owned by the API server
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(PoolConfig {
                url: url.clone(),
                max_connections: config.max_connections,
                ..PoolConfig::default()
            })
            .await?;
            tracing::info!("Connected to PostgreSQL");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running against an empty in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier = Arc::new(HttpNotifier::new(
        config.resend_api_key.clone(),
        config.email_from.clone(),
    )?);

    let jobs = MaintenanceJobs::new(store, notifier, config.app_url.clone());
    let scheduler = Scheduler::new(jobs, config.intervals);

    let token = scheduler.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, finishing running jobs...");
        token.cancel();
    });

    scheduler.run().await?;
    tracing::info!("Worker stopped");
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
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
