/// Job scheduler
///
/// Runs every maintenance job on its own fixed interval until the shutdown
/// token is cancelled. Each job gets its own Tokio task so a slow Slack
/// sweep never delays grace enforcement.
///
/// ```text
/// Scheduler
///   ├─> prune_archives   (retention + archive cap)
///   ├─> stale_cards      (Slack digests)
///   ├─> enforce_grace    (due cancellations, courtesy expiry)
///   └─> prepare_exports  (queued account exports)
/// ```
///
/// A failed run is logged and retried on the next tick.

use crate::config::JobIntervals;
use boardly_shared::jobs::MaintenanceJobs;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    PruneArchives,
    StaleCards,
    EnforceGrace,
    PrepareExports,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::PruneArchives,
        Job::StaleCards,
        Job::EnforceGrace,
        Job::PrepareExports,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Job::PruneArchives => "prune_archives",
            Job::StaleCards => "stale_cards",
            Job::EnforceGrace => "enforce_grace",
            Job::PrepareExports => "prepare_exports",
        }
    }

    pub fn interval(self, intervals: &JobIntervals) -> Duration {
        match self {
            Job::PruneArchives => intervals.prune_archives,
            Job::StaleCards => intervals.stale_cards,
            Job::EnforceGrace => intervals.enforce_grace,
            Job::PrepareExports => intervals.prepare_exports,
        }
    }
}

pub struct Scheduler {
    jobs: MaintenanceJobs,
    intervals: JobIntervals,
    shutdown_token: CancellationToken,
}

impl Scheduler {
    pub fn new(jobs: MaintenanceJobs, intervals: JobIntervals) -> Self {
        Scheduler {
            jobs,
            intervals,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Used to signal graceful shutdown from external handlers
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs a single job now and returns its report as JSON
    pub async fn run_job(jobs: &MaintenanceJobs, job: Job) -> anyhow::Result<Value> {
        let now = Utc::now();
        let report = match job {
            Job::PruneArchives => serde_json::to_value(jobs.prune_archives(now).await?)?,
            Job::StaleCards => serde_json::to_value(jobs.check_old_cards(now).await?)?,
            Job::EnforceGrace => serde_json::to_value(jobs.enforce_grace(now).await?)?,
            Job::PrepareExports => {
                serde_json::json!({ "prepared": jobs.prepare_exports(now).await? })
            }
        };
        Ok(report)
    }

    /// Runs all jobs until shutdown
    ///
    /// The first run of every job happens immediately. Returns once every
    /// job loop has observed the shutdown token; a run in progress is
    /// allowed to finish.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("Scheduler starting");

        let mut loops = JoinSet::new();
        for job in Job::ALL {
            let jobs = self.jobs.clone();
            let every = job.interval(&self.intervals);
            let shutdown = self.shutdown_token.clone();
            tracing::info!(job = job.name(), interval_secs = every.as_secs(), "Scheduling job");
            loops.spawn(job_loop(jobs, job, every, shutdown));
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Job loop panicked");
            }
        }

        tracing::info!("Scheduler shut down");
        Ok(())
    }
}

async fn job_loop(jobs: MaintenanceJobs, job: Job, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        match Scheduler::run_job(&jobs, job).await {
            Ok(report) => tracing::info!(job = job.name(), report = %report, "Job finished"),
            Err(e) => tracing::error!(job = job.name(), error = %e, "Job failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardly_shared::export::ExportService;
    use boardly_shared::models::export_token::ExportType;
    use boardly_shared::notify::RecordingNotifier;
    use boardly_shared::store::memory::MemoryStore;
    use boardly_shared::store::Store;
    use std::sync::Arc;
    use uuid::Uuid;

    fn jobs_on(store: Arc<dyn Store>) -> MaintenanceJobs {
        MaintenanceJobs::new(store, Arc::new(RecordingNotifier::new()), "http://localhost:3000")
    }

    #[test]
    fn test_job_intervals() {
        let intervals = JobIntervals::default();
        assert_eq!(Job::StaleCards.interval(&intervals), intervals.stale_cards);
        assert_eq!(Job::PrepareExports.name(), "prepare_exports");
    }

    #[tokio::test]
    async fn test_run_job_reports() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let jobs = jobs_on(store);

        let report = Scheduler::run_job(&jobs, Job::PruneArchives).await.unwrap();
        assert_eq!(report["deleted"], 0);

        let report = Scheduler::run_job(&jobs, Job::EnforceGrace).await.unwrap();
        assert_eq!(report["enforced"], 0);
    }

    #[tokio::test]
    async fn test_run_job_surfaces_store_failure() {
        let memory = Arc::new(MemoryStore::new());
        memory.set_unavailable(true);
        let jobs = jobs_on(memory);

        assert!(Scheduler::run_job(&jobs, Job::StaleCards).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_prepares_exports_and_stops_on_shutdown() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let exports = ExportService::new(store.clone());
        let user = Uuid::new_v4();
        exports
            .request(user, ExportType::Json, None, Utc::now())
            .await
            .unwrap();

        let scheduler = Scheduler::new(jobs_on(store.clone()), JobIntervals::default());
        let token = scheduler.shutdown_token();
        let handle = tokio::spawn(async move { scheduler.run().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        let pending = store.list_pending_exports(Utc::now()).await.unwrap();
        assert!(pending.is_empty());
    }
}
