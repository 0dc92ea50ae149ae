/// Subscription lifecycle: cancel, undo, admin grant/revoke and the
/// time-driven transitions run by the worker
///
/// Transitions are pure functions over [`Entitlement`] so the rules can be
/// tested without a store; [`SubscriptionService`] loads, applies, saves and
/// records the side effects.
///
/// # Rules
///
/// - immediate cancel: Pro only, and only when whole days since upgrade
///   are at most 30 or whole days until period end are at most 7. The user
///   drops to free caps at once with a 14 day courtesy window in `soft_warn`.
/// - scheduled cancel: needs a billing period end; cannot be scheduled
///   twice. Takes effect at period end, courtesy ends 14 days after that.
/// - undo: only while the scheduled cancellation is still in the future.
/// - revoke: refused while the user owns more than one board.
///
/// Downgrades never delete content. They only restrict future writes through
/// the enforcement state.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::caps::exceeds_limits;
use crate::models::audit::{AdminAction, AuditEntry, SubscriptionEvent};
use crate::models::entitlement::{
    EnforcementState, Entitlement, EntitlementStatus, Plan, PlanLimits,
};
use crate::store::{Store, StoreError};

/// Length of the post-cancellation courtesy window
pub const COURTESY_DAYS: i64 = 14;

/// Immediate cancel allowed this many whole days after upgrading
pub const IMMEDIATE_CANCEL_WINDOW_DAYS: i64 = 30;

/// Immediate cancel allowed this close to the period end
pub const PERIOD_END_WINDOW_DAYS: i64 = 7;

/// Billing period granted by an admin
pub const GRANT_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("no active Pro subscription")]
    NotPro,

    #[error("immediate cancellation is only available within 30 days of upgrading or 7 days of renewal")]
    NotEligibleForImmediateCancel,

    #[error("subscription has no billing period end")]
    MissingPeriodEnd,

    #[error("cancellation already scheduled")]
    AlreadyScheduled,

    #[error("no scheduled cancellation")]
    NoScheduledCancellation,

    #[error("cancellation already took effect")]
    CancellationAlreadyEffective,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user owns {0} boards; only a single board can be kept on the free plan")]
    TooManyBoards(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Whole days between two instants, truncated toward zero
fn whole_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days()
}

/// Whether an immediate cancellation is allowed at `now`
pub fn is_eligible_for_immediate_cancel(ent: &Entitlement, now: DateTime<Utc>) -> bool {
    let recent_upgrade = ent
        .upgraded_at
        .map_or(false, |at| whole_days(at, now) <= IMMEDIATE_CANCEL_WINDOW_DAYS);
    let near_renewal = ent
        .current_period_end
        .map_or(false, |end| whole_days(now, end) <= PERIOD_END_WINDOW_DAYS);
    recent_upgrade || near_renewal
}

/// Drops to free caps and opens a courtesy window ending at `courtesy_until`
fn downgrade(ent: &mut Entitlement, courtesy_until: DateTime<Utc>) {
    ent.plan = Plan::Free;
    ent.status = EntitlementStatus::Grace;
    ent.apply_limits(PlanLimits::for_plan(Plan::Free));
    ent.enforcement_state = EnforcementState::SoftWarn;
    ent.courtesy_until = Some(courtesy_until);
    ent.cancel_at_period_end = false;
    ent.cancel_effective_at = None;
    ent.current_period_end = None;
    ent.upgraded_at = None;
}

pub fn apply_immediate_cancel(
    ent: &mut Entitlement,
    now: DateTime<Utc>,
) -> Result<(), SubscriptionError> {
    if ent.plan != Plan::Pro {
        return Err(SubscriptionError::NotPro);
    }
    if !is_eligible_for_immediate_cancel(ent, now) {
        return Err(SubscriptionError::NotEligibleForImmediateCancel);
    }
    downgrade(ent, now + Duration::days(COURTESY_DAYS));
    Ok(())
}

pub fn apply_scheduled_cancel(ent: &mut Entitlement) -> Result<(), SubscriptionError> {
    if ent.plan != Plan::Pro {
        return Err(SubscriptionError::NotPro);
    }
    if ent.cancel_at_period_end {
        return Err(SubscriptionError::AlreadyScheduled);
    }
    let period_end = ent
        .current_period_end
        .ok_or(SubscriptionError::MissingPeriodEnd)?;

    ent.cancel_at_period_end = true;
    ent.status = EntitlementStatus::CancelScheduled;
    ent.cancel_effective_at = Some(period_end);
    ent.courtesy_until = Some(period_end + Duration::days(COURTESY_DAYS));
    Ok(())
}

pub fn apply_undo_cancel(ent: &mut Entitlement, now: DateTime<Utc>) -> Result<(), SubscriptionError> {
    if !ent.cancel_at_period_end {
        return Err(SubscriptionError::NoScheduledCancellation);
    }
    match ent.cancel_effective_at {
        Some(at) if at > now => {}
        Some(_) => return Err(SubscriptionError::CancellationAlreadyEffective),
        None => return Err(SubscriptionError::NoScheduledCancellation),
    }

    ent.status = EntitlementStatus::Active;
    ent.cancel_at_period_end = false;
    ent.cancel_effective_at = None;
    ent.courtesy_until = None;
    Ok(())
}

/// Downgrades a scheduled cancellation whose effective date has passed
///
/// Keeps the courtesy end computed when the cancellation was scheduled.
/// Returns whether the record changed.
pub fn apply_due_cancellation(ent: &mut Entitlement, now: DateTime<Utc>) -> bool {
    if ent.status != EntitlementStatus::CancelScheduled {
        return false;
    }
    let Some(effective) = ent.cancel_effective_at else {
        return false;
    };
    if effective > now {
        return false;
    }
    let courtesy_until = ent
        .courtesy_until
        .unwrap_or(effective + Duration::days(COURTESY_DAYS));
    downgrade(ent, courtesy_until);
    true
}

/// Closes an expired courtesy window
///
/// Over-limit accounts become read-only; compliant ones return to normal.
/// Returns whether the record changed.
pub fn apply_courtesy_expiry(ent: &mut Entitlement, now: DateTime<Utc>, over_limits: bool) -> bool {
    if ent.status != EntitlementStatus::Grace {
        return false;
    }
    match ent.courtesy_until {
        Some(until) if until <= now => {}
        _ => return false,
    }

    if over_limits {
        if ent.enforcement_state == EnforcementState::Enforced {
            return false;
        }
        ent.enforcement_state = EnforcementState::Enforced;
    } else {
        ent.status = EntitlementStatus::Active;
        ent.enforcement_state = EnforcementState::None;
        ent.courtesy_until = None;
    }
    true
}

pub fn apply_grant_pro(ent: &mut Entitlement, now: DateTime<Utc>) {
    ent.plan = Plan::Pro;
    ent.status = EntitlementStatus::Active;
    ent.apply_limits(PlanLimits::for_plan(Plan::Pro));
    ent.enforcement_state = EnforcementState::None;
    ent.cancel_at_period_end = false;
    ent.cancel_effective_at = None;
    ent.courtesy_until = None;
    ent.upgraded_at = Some(now);
    ent.current_period_end = Some(now + Duration::days(GRANT_PERIOD_DAYS));
}

pub fn apply_revoke_pro(ent: &mut Entitlement, board_count: u32) -> Result<(), SubscriptionError> {
    if board_count > 1 {
        return Err(SubscriptionError::TooManyBoards(board_count));
    }
    ent.plan = Plan::Free;
    ent.status = EntitlementStatus::Active;
    ent.apply_limits(PlanLimits::for_plan(Plan::Free));
    ent.enforcement_state = EnforcementState::None;
    ent.cancel_at_period_end = false;
    ent.cancel_effective_at = None;
    ent.courtesy_until = None;
    ent.current_period_end = None;
    ent.upgraded_at = None;
    Ok(())
}

/// Grant target: a user id or an email address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantTarget {
    UserId(Uuid),
    Email(String),
}

/// Outcome of a courtesy sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CourtesySweep {
    /// Users moved into read-only lockdown
    pub enforced: Vec<Uuid>,
    pub restored: usize,
}

/// Subscription lifecycle service
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn Store>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        SubscriptionService { store }
    }

    async fn record_event(&self, user_id: Uuid, event_type: &str, payload: serde_json::Value) {
        let event = SubscriptionEvent::new(Some(user_id), event_type, payload);
        if let Err(e) = self.store.record_subscription_event(&event).await {
            warn!(user_id = %user_id, event_type, error = %e, "Failed to record subscription event");
        }
    }

    async fn record_admin(&self, admin_id: Uuid, action: AdminAction, target: Uuid, details: serde_json::Value) {
        let entry = AuditEntry::new(admin_id, action, target, details);
        if let Err(e) = self.store.record_admin_action(&entry).await {
            warn!(
                admin_id = %admin_id,
                action = action.as_str(),
                error = %e,
                "Failed to write admin audit log"
            );
        }
    }

    /// Whether the user's content exceeds free plan caps
    pub async fn over_free_limits(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let boards = self.store.list_boards(user_id).await?;
        let mut per_board = Vec::with_capacity(boards.len());
        for board in &boards {
            per_board.push(self.store.count_active_tasks(board.id).await?);
        }
        Ok(exceeds_limits(
            &PlanLimits::for_plan(Plan::Free),
            boards.len() as u32,
            &per_board,
        ))
    }

    /// Cancels now or at period end
    pub async fn cancel(
        &self,
        user_id: Uuid,
        cancel_now: bool,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, SubscriptionError> {
        let mut ent = self.store.get_or_create_entitlement(user_id).await?;

        if cancel_now {
            apply_immediate_cancel(&mut ent, now)?;
        } else {
            apply_scheduled_cancel(&mut ent)?;
        }
        self.store.save_entitlement(&ent).await?;

        info!(
            user_id = %user_id,
            cancel_now,
            courtesy_until = ?ent.courtesy_until,
            "Subscription cancelled"
        );
        let event_type = if cancel_now {
            "cancelled_immediately"
        } else {
            "cancel_scheduled"
        };
        self.record_event(
            user_id,
            event_type,
            json!({
                "cancel_effective_at": ent.cancel_effective_at,
                "courtesy_until": ent.courtesy_until,
            }),
        )
        .await;

        Ok(ent)
    }

    pub async fn undo_cancel(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, SubscriptionError> {
        let mut ent = self.store.get_or_create_entitlement(user_id).await?;
        apply_undo_cancel(&mut ent, now)?;
        self.store.save_entitlement(&ent).await?;

        info!(user_id = %user_id, "Scheduled cancellation undone");
        self.record_event(user_id, "cancel_undone", json!({})).await;
        Ok(ent)
    }

    pub async fn grant_pro(
        &self,
        admin_id: Uuid,
        target: GrantTarget,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, SubscriptionError> {
        let profile = match &target {
            GrantTarget::UserId(id) => self.store.find_profile(*id).await?,
            GrantTarget::Email(email) => self.store.find_profile_by_email(email).await?,
        };
        let profile = profile.ok_or_else(|| {
            SubscriptionError::UserNotFound(match &target {
                GrantTarget::UserId(id) => id.to_string(),
                GrantTarget::Email(email) => email.clone(),
            })
        })?;

        let mut ent = self.store.get_or_create_entitlement(profile.id).await?;
        let previous = ent.plan;
        apply_grant_pro(&mut ent, now);
        self.store.save_entitlement(&ent).await?;

        info!(admin_id = %admin_id, user_id = %profile.id, "Pro granted");
        self.record_admin(
            admin_id,
            AdminAction::GrantPro,
            profile.id,
            json!({
                "previous_plan": previous.as_str(),
                "current_period_end": ent.current_period_end,
            }),
        )
        .await;
        self.record_event(profile.id, "pro_granted", json!({ "admin_id": admin_id }))
            .await;

        Ok(ent)
    }

    /// Revokes Pro; refused without mutation while the user owns more than
    /// one board
    pub async fn revoke_pro(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
    ) -> Result<Entitlement, SubscriptionError> {
        if self.store.find_profile(user_id).await?.is_none() {
            return Err(SubscriptionError::UserNotFound(user_id.to_string()));
        }

        let board_count = self.store.count_boards(user_id).await?;
        let mut ent = self.store.get_or_create_entitlement(user_id).await?;
        let previous = ent.plan;
        apply_revoke_pro(&mut ent, board_count)?;
        self.store.save_entitlement(&ent).await?;

        info!(admin_id = %admin_id, user_id = %user_id, "Pro revoked");
        self.record_admin(
            admin_id,
            AdminAction::RevokePro,
            user_id,
            json!({ "previous_plan": previous.as_str(), "board_count": board_count }),
        )
        .await;
        self.record_event(user_id, "pro_revoked", json!({ "admin_id": admin_id }))
            .await;

        Ok(ent)
    }

    /// Applies every scheduled cancellation that is due; returns the count
    pub async fn apply_due_cancellations(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let scheduled = self
            .store
            .list_entitlements_by_status(EntitlementStatus::CancelScheduled)
            .await?;

        let mut applied = 0;
        for mut ent in scheduled {
            if !apply_due_cancellation(&mut ent, now) {
                continue;
            }
            if let Err(e) = self.store.save_entitlement(&ent).await {
                warn!(user_id = %ent.user_id, error = %e, "Failed to apply due cancellation");
                continue;
            }
            info!(user_id = %ent.user_id, courtesy_until = ?ent.courtesy_until, "Scheduled cancellation applied");
            self.record_event(
                ent.user_id,
                "cancellation_applied",
                json!({ "courtesy_until": ent.courtesy_until }),
            )
            .await;
            applied += 1;
        }
        Ok(applied)
    }

    /// Closes expired courtesy windows
    pub async fn sweep_expired_courtesy(&self, now: DateTime<Utc>) -> Result<CourtesySweep, StoreError> {
        let in_grace = self
            .store
            .list_entitlements_by_status(EntitlementStatus::Grace)
            .await?;

        let mut sweep = CourtesySweep::default();
        for mut ent in in_grace {
            let expired = ent.courtesy_until.map_or(false, |until| until <= now);
            if !expired {
                continue;
            }
            let over = match self.over_free_limits(ent.user_id).await {
                Ok(over) => over,
                Err(e) => {
                    warn!(user_id = %ent.user_id, error = %e, "Usage lookup failed, skipping");
                    continue;
                }
            };
            if !apply_courtesy_expiry(&mut ent, now, over) {
                continue;
            }
            if let Err(e) = self.store.save_entitlement(&ent).await {
                warn!(user_id = %ent.user_id, error = %e, "Failed to close courtesy window");
                continue;
            }

            if over {
                info!(user_id = %ent.user_id, "Courtesy expired over limits, enforcing read-only");
                self.record_event(ent.user_id, "enforcement_started", json!({})).await;
                sweep.enforced.push(ent.user_id);
            } else {
                info!(user_id = %ent.user_id, "Courtesy expired within limits");
                self.record_event(ent.user_id, "grace_ended", json!({})).await;
                sweep.restored += 1;
            }
        }
        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::board::Board;
    use crate::store::memory::MemoryStore;
    use crate::store::{BoardRepo, EntitlementRepo, ProfileRepo};

    fn pro(now: DateTime<Utc>, days_since_upgrade: i64, days_until_end: i64) -> Entitlement {
        let mut ent = Entitlement::free_default(Uuid::new_v4(), now);
        apply_grant_pro(&mut ent, now - Duration::days(days_since_upgrade));
        ent.current_period_end = Some(now + Duration::days(days_until_end));
        ent
    }

    async fn add_boards(store: &MemoryStore, user_id: Uuid, n: usize) {
        for i in 0..n {
            let now = Utc::now();
            let board = Board {
                id: Uuid::new_v4(),
                user_id,
                title: format!("Board {}", i),
                description: None,
                created_at: now,
                updated_at: now,
            };
            store.insert_board(&board, &[]).await.unwrap();
        }
    }

    #[test]
    fn test_immediate_cancel_eligibility() {
        let now = Utc::now();
        assert!(is_eligible_for_immediate_cancel(&pro(now, 30, 200), now));
        assert!(!is_eligible_for_immediate_cancel(&pro(now, 31, 200), now));
        assert!(is_eligible_for_immediate_cancel(&pro(now, 200, 7), now));
        assert!(!is_eligible_for_immediate_cancel(&pro(now, 40, 20), now));
    }

    #[test]
    fn test_immediate_cancel_40_days_after_upgrade_rejected() {
        let now = Utc::now();
        let mut ent = pro(now, 40, 20);
        let before = ent.clone();
        assert!(matches!(
            apply_immediate_cancel(&mut ent, now),
            Err(SubscriptionError::NotEligibleForImmediateCancel)
        ));
        assert_eq!(ent, before);
    }

    #[test]
    fn test_immediate_cancel_downgrades_with_courtesy() {
        let now = Utc::now();
        let mut ent = pro(now, 5, 25);
        apply_immediate_cancel(&mut ent, now).unwrap();

        assert_eq!(ent.plan, Plan::Free);
        assert_eq!(ent.status, EntitlementStatus::Grace);
        assert_eq!(ent.enforcement_state, EnforcementState::SoftWarn);
        assert_eq!(ent.courtesy_until, Some(now + Duration::days(14)));
        assert_eq!(ent.limits(), PlanLimits::for_plan(Plan::Free));
        assert!(!ent.cancel_at_period_end);
        assert!(ent.is_consistent());
    }

    #[test]
    fn test_cancel_requires_pro() {
        let now = Utc::now();
        let mut ent = Entitlement::free_default(Uuid::new_v4(), now);
        assert!(matches!(
            apply_immediate_cancel(&mut ent, now),
            Err(SubscriptionError::NotPro)
        ));
        assert!(matches!(
            apply_scheduled_cancel(&mut ent),
            Err(SubscriptionError::NotPro)
        ));
    }

    #[test]
    fn test_scheduled_cancel_and_double_schedule() {
        let now = Utc::now();
        let mut ent = pro(now, 40, 20);
        apply_scheduled_cancel(&mut ent).unwrap();

        let end = now + Duration::days(20);
        assert_eq!(ent.status, EntitlementStatus::CancelScheduled);
        assert_eq!(ent.cancel_effective_at, Some(end));
        assert_eq!(ent.courtesy_until, Some(end + Duration::days(14)));
        assert_eq!(ent.plan, Plan::Pro);
        assert!(ent.is_consistent());

        assert!(matches!(
            apply_scheduled_cancel(&mut ent),
            Err(SubscriptionError::AlreadyScheduled)
        ));
    }

    #[test]
    fn test_scheduled_cancel_needs_period_end() {
        let now = Utc::now();
        let mut ent = pro(now, 1, 1);
        ent.current_period_end = None;
        assert!(matches!(
            apply_scheduled_cancel(&mut ent),
            Err(SubscriptionError::MissingPeriodEnd)
        ));
    }

    #[test]
    fn test_undo_cancel_rules() {
        let now = Utc::now();
        let mut ent = pro(now, 40, 20);
        assert!(matches!(
            apply_undo_cancel(&mut ent, now),
            Err(SubscriptionError::NoScheduledCancellation)
        ));

        apply_scheduled_cancel(&mut ent).unwrap();
        let later = now + Duration::days(21);
        assert!(matches!(
            apply_undo_cancel(&mut ent.clone(), later),
            Err(SubscriptionError::CancellationAlreadyEffective)
        ));

        apply_undo_cancel(&mut ent, now).unwrap();
        assert_eq!(ent.status, EntitlementStatus::Active);
        assert!(ent.cancel_effective_at.is_none());
        assert!(ent.courtesy_until.is_none());
    }

    #[test]
    fn test_due_cancellation_keeps_courtesy() {
        let now = Utc::now();
        let mut ent = pro(now, 40, 20);
        apply_scheduled_cancel(&mut ent).unwrap();
        let courtesy = ent.courtesy_until;

        assert!(!apply_due_cancellation(&mut ent, now));
        assert!(apply_due_cancellation(&mut ent, now + Duration::days(20)));
        assert_eq!(ent.plan, Plan::Free);
        assert_eq!(ent.status, EntitlementStatus::Grace);
        assert_eq!(ent.courtesy_until, courtesy);
    }

    #[test]
    fn test_courtesy_expiry() {
        let now = Utc::now();
        let mut ent = pro(now, 1, 1);
        apply_immediate_cancel(&mut ent, now).unwrap();

        let mut early = ent.clone();
        assert!(!apply_courtesy_expiry(&mut early, now, true));

        let after = now + Duration::days(15);
        let mut over = ent.clone();
        assert!(apply_courtesy_expiry(&mut over, after, true));
        assert_eq!(over.enforcement_state, EnforcementState::Enforced);
        assert!(over.is_read_only());
        assert!(!apply_courtesy_expiry(&mut over, after, true));

        assert!(apply_courtesy_expiry(&mut ent, after, false));
        assert_eq!(ent.status, EntitlementStatus::Active);
        assert_eq!(ent.enforcement_state, EnforcementState::None);
    }

    #[test]
    fn test_grant_target_deserializes_untagged() {
        let id = Uuid::new_v4();
        let target: GrantTarget = serde_json::from_value(json!(id)).unwrap();
        assert_eq!(target, GrantTarget::UserId(id));
        let target: GrantTarget = serde_json::from_value(json!("a@b.io")).unwrap();
        assert_eq!(target, GrantTarget::Email("a@b.io".to_string()));
    }

    #[tokio::test]
    async fn test_revoke_with_two_boards_is_conflict_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.ensure_profile(user, "u@example.com").await.unwrap();
        let service = SubscriptionService::new(store.clone());
        service
            .grant_pro(Uuid::new_v4(), GrantTarget::UserId(user), Utc::now())
            .await
            .unwrap();
        add_boards(&store, user, 2).await;
        let before = store.find_entitlement(user).await.unwrap();

        let err = service.revoke_pro(Uuid::new_v4(), user).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::TooManyBoards(2)));
        assert_eq!(store.find_entitlement(user).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_grant_by_email_writes_audit() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.ensure_profile(user, "Pat@Example.com").await.unwrap();
        let service = SubscriptionService::new(store.clone());
        let admin = Uuid::new_v4();

        let ent = service
            .grant_pro(admin, GrantTarget::Email("pat@example.com".to_string()), Utc::now())
            .await
            .unwrap();

        assert_eq!(ent.plan, Plan::Pro);
        assert_eq!(ent.board_cap, 500);
        let log = store.admin_audit_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].admin_id, admin);
        assert_eq!(log[0].action, AdminAction::GrantPro);
    }

    #[tokio::test]
    async fn test_grant_unknown_user() {
        let store = Arc::new(MemoryStore::new());
        let service = SubscriptionService::new(store);
        let err = service
            .grant_pro(Uuid::new_v4(), GrantTarget::Email("ghost@example.com".to_string()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_audit_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.ensure_profile(user, "u@example.com").await.unwrap();
        store.set_fail_audit(true);
        let service = SubscriptionService::new(store.clone());

        let ent = service
            .grant_pro(Uuid::new_v4(), GrantTarget::UserId(user), Utc::now())
            .await
            .unwrap();
        assert_eq!(ent.plan, Plan::Pro);
        assert!(store.admin_audit_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_worker_transitions() {
        let store = Arc::new(MemoryStore::new());
        let service = SubscriptionService::new(store.clone());
        let now = Utc::now();

        let scheduled_user = Uuid::new_v4();
        let mut ent = pro(now, 40, 1);
        ent.user_id = scheduled_user;
        apply_scheduled_cancel(&mut ent).unwrap();
        store.save_entitlement(&ent).await.unwrap();
        add_boards(&store, scheduled_user, 3).await;

        let applied = service
            .apply_due_cancellations(now + Duration::days(2))
            .await
            .unwrap();
        assert_eq!(applied, 1);
        let ent = store.find_entitlement(scheduled_user).await.unwrap().unwrap();
        assert_eq!(ent.status, EntitlementStatus::Grace);
        assert_eq!(ent.enforcement_state, EnforcementState::SoftWarn);

        let sweep = service
            .sweep_expired_courtesy(now + Duration::days(16))
            .await
            .unwrap();
        assert_eq!(
            sweep,
            CourtesySweep {
                enforced: vec![scheduled_user],
                restored: 0
            }
        );
        let ent = store.find_entitlement(scheduled_user).await.unwrap().unwrap();
        assert!(ent.is_read_only());
        assert!(!store.subscription_events().await.is_empty());
    }
}
