/// Cap enforcement against the user's entitlement
///
/// Caps gate creation: boards per user, active tasks per board and archived
/// tasks per user. Every check fails closed: when the entitlement or a count
/// cannot be read the answer is "not allowed" with reason `lookup_failed`.
/// While an entitlement is in `enforced` state every check answers
/// `read_only` and board mutations are refused.
///
/// Checks are not serialized against concurrent creates; two racing
/// requests can both pass a check at `limit - 1`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use boardly_shared::caps::CapEnforcer;
/// use boardly_shared::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example() {
/// let enforcer = CapEnforcer::new(Arc::new(MemoryStore::new()));
/// let result = enforcer.check_board_cap(Uuid::new_v4()).await;
/// if !result.allowed {
///     println!("board cap: {}/{}", result.current, result.limit);
/// }
/// # }
/// ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::entitlement::{
    EnforcementState, Entitlement, EntitlementStatus, Plan, PlanLimits,
};
use crate::store::{Store, StoreError};

/// Resource a cap applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapType {
    Boards,
    ActiveTasks,
    ArchivedTasks,
}

impl CapType {
    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            CapType::Boards => "Boards",
            CapType::ActiveTasks => "Active tasks",
            CapType::ArchivedTasks => "Archived tasks",
        }
    }
}

/// Why a check denied the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapReason {
    LimitReached,
    ReadOnly,
    LookupFailed,
}

impl CapReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapReason::LimitReached => "limit_reached",
            CapReason::ReadOnly => "read_only",
            CapReason::LookupFailed => "lookup_failed",
        }
    }
}

/// Result of a cap check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapCheckResult {
    pub allowed: bool,
    pub current: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CapReason>,
}

impl CapCheckResult {
    pub fn allowed(current: u32, limit: u32) -> Self {
        CapCheckResult {
            allowed: true,
            current,
            limit,
            reason: None,
        }
    }

    pub fn denied(current: u32, limit: u32, reason: CapReason) -> Self {
        CapCheckResult {
            allowed: false,
            current,
            limit,
            reason: Some(reason),
        }
    }

    /// Compares a count to its limit; `current >= limit` denies
    pub fn evaluate(current: u32, limit: u32) -> Self {
        if current >= limit {
            Self::denied(current, limit, CapReason::LimitReached)
        } else {
            Self::allowed(current, limit)
        }
    }

    pub fn lookup_failed() -> Self {
        Self::denied(0, 0, CapReason::LookupFailed)
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current)
    }
}

/// Cap violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapError {
    #[error("{} cap exceeded ({current}/{limit}, {})", .cap_type.as_str(), .reason.as_str())]
    Exceeded {
        cap_type: CapType,
        current: u32,
        limit: u32,
        reason: CapReason,
    },
}

impl CapError {
    pub fn from_check(cap_type: CapType, result: CapCheckResult) -> Self {
        CapError::Exceeded {
            cap_type,
            current: result.current,
            limit: result.limit,
            reason: result.reason.unwrap_or(CapReason::LimitReached),
        }
    }

    pub fn reason(&self) -> CapReason {
        match self {
            CapError::Exceeded { reason, .. } => *reason,
        }
    }
}

/// Active task count of one board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardUsage {
    pub board_id: Uuid,
    pub title: String,
    pub active_tasks: u32,
}

/// Aggregated usage returned by `GET /api/usage`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub plan: Plan,
    pub status: EntitlementStatus,
    pub enforcement_state: EnforcementState,
    pub limits: PlanLimits,
    pub board_count: u32,
    pub active_task_count: u32,
    pub archived_task_count: u32,
    pub boards: Vec<BoardUsage>,
    pub cancel_at_period_end: bool,
    pub cancel_effective_at: Option<DateTime<Utc>>,
    pub courtesy_until: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,

    /// Whether current content exceeds the free plan caps
    pub over_free_limits: bool,
}

/// Whether content exceeds the given limits (boards or any board's tasks)
pub fn exceeds_limits(limits: &PlanLimits, board_count: u32, per_board_active: &[u32]) -> bool {
    board_count > limits.board_cap
        || per_board_active
            .iter()
            .any(|&count| count > limits.active_cap_per_board)
}

/// Cap enforcement service
#[derive(Clone)]
pub struct CapEnforcer {
    store: Arc<dyn Store>,
}

impl CapEnforcer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        CapEnforcer { store }
    }

    async fn entitlement(&self, user_id: Uuid) -> Result<Entitlement, StoreError> {
        self.store.get_or_create_entitlement(user_id).await
    }

    /// Checks whether the user may create another board
    pub async fn check_board_cap(&self, user_id: Uuid) -> CapCheckResult {
        let ent = match self.entitlement(user_id).await {
            Ok(ent) => ent,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Board cap lookup failed, denying");
                return CapCheckResult::lookup_failed();
            }
        };

        let current = match self.store.count_boards(user_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Board count failed, denying");
                return CapCheckResult::denied(0, ent.board_cap, CapReason::LookupFailed);
            }
        };

        if ent.is_read_only() {
            return CapCheckResult::denied(current, ent.board_cap, CapReason::ReadOnly);
        }

        let result = CapCheckResult::evaluate(current, ent.board_cap);
        debug!(
            user_id = %user_id,
            current = result.current,
            limit = result.limit,
            allowed = result.allowed,
            "Board cap checked"
        );
        result
    }

    /// Checks whether another active task fits on the board
    pub async fn check_task_cap(&self, board_id: Uuid, user_id: Uuid) -> CapCheckResult {
        let ent = match self.entitlement(user_id).await {
            Ok(ent) => ent,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Task cap lookup failed, denying");
                return CapCheckResult::lookup_failed();
            }
        };

        let current = match self.store.count_active_tasks(board_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(board_id = %board_id, error = %e, "Task count failed, denying");
                return CapCheckResult::denied(0, ent.active_cap_per_board, CapReason::LookupFailed);
            }
        };

        if ent.is_read_only() {
            return CapCheckResult::denied(current, ent.active_cap_per_board, CapReason::ReadOnly);
        }

        CapCheckResult::evaluate(current, ent.active_cap_per_board)
    }

    /// Checks whether the user may archive another task
    pub async fn check_archive_cap(&self, user_id: Uuid) -> CapCheckResult {
        let ent = match self.entitlement(user_id).await {
            Ok(ent) => ent,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Archive cap lookup failed, denying");
                return CapCheckResult::lookup_failed();
            }
        };

        let current = match self.store.count_archived_tasks(user_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Archived count failed, denying");
                return CapCheckResult::denied(
                    0,
                    ent.archived_cap_per_user,
                    CapReason::LookupFailed,
                );
            }
        };

        if ent.is_read_only() {
            return CapCheckResult::denied(current, ent.archived_cap_per_user, CapReason::ReadOnly);
        }

        CapCheckResult::evaluate(current, ent.archived_cap_per_user)
    }

    /// Turns a denied check into an error
    pub fn enforce(cap_type: CapType, result: CapCheckResult) -> Result<CapCheckResult, CapError> {
        if result.allowed {
            Ok(result)
        } else {
            Err(CapError::from_check(cap_type, result))
        }
    }

    /// Refuses mutations while the entitlement is in read-only lockdown
    ///
    /// Fails closed when the entitlement cannot be read.
    pub async fn ensure_writable(&self, user_id: Uuid) -> Result<(), CapError> {
        match self.entitlement(user_id).await {
            Ok(ent) if ent.is_read_only() => Err(CapError::Exceeded {
                cap_type: CapType::Boards,
                current: 0,
                limit: ent.board_cap,
                reason: CapReason::ReadOnly,
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Entitlement lookup failed, denying write");
                Err(CapError::from_check(
                    CapType::Boards,
                    CapCheckResult::lookup_failed(),
                ))
            }
        }
    }

    /// Aggregates usage and subscription state, provisioning the entitlement
    /// on first call
    pub async fn usage_stats(&self, user_id: Uuid) -> Result<UsageStats, StoreError> {
        let ent = self.entitlement(user_id).await?;
        let boards = self.store.list_boards(user_id).await?;

        let mut usage = Vec::with_capacity(boards.len());
        for board in boards {
            let active_tasks = self.store.count_active_tasks(board.id).await?;
            usage.push(BoardUsage {
                board_id: board.id,
                title: board.title,
                active_tasks,
            });
        }
        let archived_task_count = self.store.count_archived_tasks(user_id).await?;

        let per_board: Vec<u32> = usage.iter().map(|b| b.active_tasks).collect();
        let board_count = usage.len() as u32;
        let over_free_limits =
            exceeds_limits(&PlanLimits::for_plan(Plan::Free), board_count, &per_board);

        Ok(UsageStats {
            plan: ent.plan,
            status: ent.status,
            enforcement_state: ent.enforcement_state,
            limits: ent.limits(),
            board_count,
            active_task_count: per_board.iter().sum(),
            archived_task_count,
            boards: usage,
            cancel_at_period_end: ent.cancel_at_period_end,
            cancel_effective_at: ent.cancel_effective_at,
            courtesy_until: ent.courtesy_until,
            current_period_end: ent.current_period_end,
            over_free_limits,
        })
    }
}
