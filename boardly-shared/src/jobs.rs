/// Periodic maintenance jobs
///
/// Shared by the worker's scheduler and the cron-secret HTTP endpoints.
/// Each job is idempotent and reports what it did; per-user failures are
/// logged and skipped so one bad row cannot stall a sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::export::{ExportError, ExportService};
use crate::notify::{lockdown_email, send_logged, stale_cards_text, Message, Notifier};
use crate::store::{Store, StoreError};
use crate::subscription::SubscriptionService;

/// Cards untouched for longer than this are reported to Slack
pub const STALE_CARD_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub users: usize,
    pub deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaleCardReport {
    pub users_checked: usize,
    pub alerts_sent: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraceReport {
    pub cancellations_applied: usize,
    pub enforced: usize,
    pub restored: usize,
}

#[derive(Clone)]
pub struct MaintenanceJobs {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    subscriptions: SubscriptionService,
    exports: ExportService,
    app_url: String,
}

impl MaintenanceJobs {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, app_url: impl Into<String>) -> Self {
        MaintenanceJobs {
            subscriptions: SubscriptionService::new(store.clone()),
            exports: ExportService::new(store.clone()),
            store,
            notifier,
            app_url: app_url.into(),
        }
    }

    /// Deletes archived tasks past retention or beyond the per-user cap
    pub async fn prune_archives(&self, now: DateTime<Utc>) -> Result<PruneReport, StoreError> {
        let users = self.store.list_users_with_archived().await?;
        let mut report = PruneReport::default();

        for user_id in users {
            let ent = match self.store.get_or_create_entitlement(user_id).await {
                Ok(ent) => ent,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Entitlement lookup failed, skipping prune");
                    continue;
                }
            };
            let cutoff = now - Duration::days(i64::from(ent.archive_retention_days));
            match self
                .store
                .prune_archives_for_user(user_id, cutoff, ent.archived_cap_per_user)
                .await
            {
                Ok(deleted) => {
                    report.users += 1;
                    report.deleted += deleted;
                }
                Err(e) => warn!(user_id = %user_id, error = %e, "Archive prune failed"),
            }
        }

        info!(users = report.users, deleted = report.deleted, "Archive prune finished");
        Ok(report)
    }

    /// Sends a Slack digest of stale cards to every opted-in user
    pub async fn check_old_cards(&self, now: DateTime<Utc>) -> Result<StaleCardReport, StoreError> {
        let profiles = self.store.list_stale_alert_profiles().await?;
        let cutoff = now - Duration::days(STALE_CARD_DAYS);
        let mut report = StaleCardReport::default();

        for profile in profiles {
            let Some(webhook_url) = profile.slack_webhook_url.clone() else {
                continue;
            };
            report.users_checked += 1;

            let stale = match self.store.list_stale_tasks(profile.id, cutoff).await {
                Ok(stale) => stale,
                Err(e) => {
                    warn!(user_id = %profile.id, error = %e, "Stale card lookup failed");
                    report.failures += 1;
                    continue;
                }
            };
            if stale.is_empty() {
                continue;
            }

            let message = Message::Slack {
                webhook_url,
                text: stale_cards_text(&stale, STALE_CARD_DAYS),
            };
            match send_logged(&self.store, self.notifier.as_ref(), profile.id, "stale_cards", &message).await {
                Ok(()) => report.alerts_sent += 1,
                Err(_) => report.failures += 1,
            }
        }

        info!(
            checked = report.users_checked,
            sent = report.alerts_sent,
            failures = report.failures,
            "Stale card check finished"
        );
        Ok(report)
    }

    /// Applies due cancellations, then closes expired courtesy windows
    pub async fn enforce_grace(&self, now: DateTime<Utc>) -> Result<GraceReport, StoreError> {
        let cancellations_applied = self.subscriptions.apply_due_cancellations(now).await?;
        let sweep = self.subscriptions.sweep_expired_courtesy(now).await?;

        for user_id in &sweep.enforced {
            self.notify_lockdown(*user_id).await;
        }

        Ok(GraceReport {
            cancellations_applied,
            enforced: sweep.enforced.len(),
            restored: sweep.restored,
        })
    }

    async fn notify_lockdown(&self, user_id: Uuid) {
        let profile = match self.store.find_profile(user_id).await {
            Ok(Some(profile)) if profile.email_notifications => profile,
            Ok(_) => return,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile lookup failed, skipping lockdown email");
                return;
            }
        };
        let message = lockdown_email(&profile.email, &self.app_url);
        send_logged(&self.store, self.notifier.as_ref(), user_id, "lockdown", &message)
            .await
            .ok();
    }

    pub async fn prepare_exports(&self, now: DateTime<Utc>) -> Result<usize, ExportError> {
        let prepared = self.exports.prepare_pending(now).await?;
        if prepared > 0 {
            info!(prepared = prepared, "Queued exports prepared");
        }
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::BoardService;
    use crate::models::board::CreateBoard;
    use crate::models::export_token::{ExportStatus, ExportType};
    use crate::models::entitlement::{EntitlementStatus, EnforcementState, Plan, PlanLimits};
    use crate::models::task::NewTask;
    use crate::notify::RecordingNotifier;
    use crate::store::memory::MemoryStore;
    use crate::store::{EntitlementRepo, ProfileRepo, TaskRepo};

    struct Harness {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        jobs: MaintenanceJobs,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let jobs = MaintenanceJobs::new(store.clone(), notifier.clone(), "https://app.example.com");
        Harness {
            store,
            notifier,
            jobs,
        }
    }

    async fn board_with_tasks(store: &Arc<MemoryStore>, user: Uuid, titles: &[&str]) -> Vec<Uuid> {
        let boards = BoardService::new(store.clone());
        let detail = boards
            .create_board(
                user,
                CreateBoard {
                    title: "Ops".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let mut ids = Vec::new();
        for title in titles {
            let task = boards
                .create_task(
                    user,
                    detail.board.id,
                    NewTask {
                        column_id: detail.columns[0].column.id,
                        title: title.to_string(),
                        description: None,
                        category: String::new(),
                    },
                )
                .await
                .unwrap();
            ids.push(task.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_prune_respects_retention() {
        let h = harness();
        let user = Uuid::new_v4();
        let ids = board_with_tasks(&h.store, user, &["old", "fresh"]).await;
        let now = Utc::now();
        h.store
            .archive_tasks(&[ids[0]], now - Duration::days(40), &[])
            .await
            .unwrap();
        h.store
            .archive_tasks(&[ids[1]], now - Duration::days(1), &[])
            .await
            .unwrap();

        let report = h.jobs.prune_archives(now).await.unwrap();

        assert_eq!(report, PruneReport { users: 1, deleted: 1 });
        assert!(h.store.find_task(ids[0]).await.unwrap().is_none());
        assert!(h.store.find_task(ids[1]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_cards_sent_to_opted_in_users() {
        let h = harness();
        let user = Uuid::new_v4();
        board_with_tasks(&h.store, user, &["dusty"]).await;
        let mut profile = h.store.ensure_profile(user, "u@example.com").await.unwrap();
        profile.stale_card_alerts = true;
        profile.slack_webhook_url = Some("https://hooks.slack.com/services/T/B/X".to_string());
        h.store.save_profile(&profile).await.unwrap();

        let report = h
            .jobs
            .check_old_cards(Utc::now() + Duration::days(STALE_CARD_DAYS + 1))
            .await
            .unwrap();

        assert_eq!(report.alerts_sent, 1);
        let sent = h.notifier.sent().await;
        assert!(matches!(&sent[0], Message::Slack { text, .. } if text.contains("dusty")));
    }

    #[tokio::test]
    async fn test_fresh_cards_not_reported() {
        let h = harness();
        let user = Uuid::new_v4();
        board_with_tasks(&h.store, user, &["new"]).await;
        let mut profile = h.store.ensure_profile(user, "u@example.com").await.unwrap();
        profile.stale_card_alerts = true;
        profile.slack_webhook_url = Some("https://hooks.slack.com/services/T/B/X".to_string());
        h.store.save_profile(&profile).await.unwrap();

        let report = h.jobs.check_old_cards(Utc::now()).await.unwrap();

        assert_eq!(report.users_checked, 1);
        assert_eq!(report.alerts_sent, 0);
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_enforce_grace_locks_and_emails() {
        let h = harness();
        let user = Uuid::new_v4();
        h.store.ensure_profile(user, "over@example.com").await.unwrap();

        let mut ent = h.store.get_or_create_entitlement(user).await.unwrap();
        ent.plan = Plan::Pro;
        ent.apply_limits(PlanLimits::for_plan(Plan::Pro));
        h.store.save_entitlement(&ent).await.unwrap();
        board_with_tasks(&h.store, user, &[]).await;
        board_with_tasks(&h.store, user, &[]).await;

        let now = Utc::now();
        let mut ent = h.store.find_entitlement(user).await.unwrap().unwrap();
        ent.plan = Plan::Free;
        ent.apply_limits(PlanLimits::for_plan(Plan::Free));
        ent.status = EntitlementStatus::Grace;
        ent.enforcement_state = EnforcementState::SoftWarn;
        ent.courtesy_until = Some(now - Duration::hours(1));
        h.store.save_entitlement(&ent).await.unwrap();

        let report = h.jobs.enforce_grace(now).await.unwrap();

        assert_eq!(report.enforced, 1);
        let ent = h.store.find_entitlement(user).await.unwrap().unwrap();
        assert_eq!(ent.enforcement_state, EnforcementState::Enforced);
        let sent = h.notifier.sent().await;
        assert!(matches!(&sent[0], Message::Email { to, .. } if to == "over@example.com"));
    }

    #[tokio::test]
    async fn test_enforce_grace_survives_failed_lockdown_email() {
        let h = harness();
        h.notifier.set_fail(true);
        let user = Uuid::new_v4();
        h.store.ensure_profile(user, "over@example.com").await.unwrap();

        let mut ent = h.store.get_or_create_entitlement(user).await.unwrap();
        ent.plan = Plan::Pro;
        ent.apply_limits(PlanLimits::for_plan(Plan::Pro));
        h.store.save_entitlement(&ent).await.unwrap();
        board_with_tasks(&h.store, user, &[]).await;
        board_with_tasks(&h.store, user, &[]).await;

        let now = Utc::now();
        let mut ent = h.store.find_entitlement(user).await.unwrap().unwrap();
        ent.plan = Plan::Free;
        ent.apply_limits(PlanLimits::for_plan(Plan::Free));
        ent.status = EntitlementStatus::Grace;
        ent.enforcement_state = EnforcementState::SoftWarn;
        ent.courtesy_until = Some(now - Duration::hours(1));
        h.store.save_entitlement(&ent).await.unwrap();

        let report = h.jobs.enforce_grace(now).await.unwrap();

        assert_eq!(report.enforced, 1);
        let log = h.store.notifications().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, "lockdown");
        assert!(!log[0].success);
    }

    #[tokio::test]
    async fn test_prepare_exports() {
        let h = harness();
        let user = Uuid::new_v4();
        let exports = ExportService::new(h.store.clone());
        let ticket = exports
            .request(user, ExportType::Json, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(ticket.status, ExportStatus::Pending);

        assert_eq!(h.jobs.prepare_exports(Utc::now()).await.unwrap(), 1);
        assert_eq!(h.jobs.prepare_exports(Utc::now()).await.unwrap(), 0);
    }
}
