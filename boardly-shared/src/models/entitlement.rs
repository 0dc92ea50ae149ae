/// Entitlement model: plan tier, resource caps and subscription state
///
/// Every user has exactly one entitlement row. It is provisioned lazily with
/// free-plan defaults the first time anything asks for it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE entitlements (
///     user_id UUID PRIMARY KEY,
///     plan TEXT NOT NULL DEFAULT 'free',
///     status TEXT NOT NULL DEFAULT 'active',
///     board_cap INTEGER NOT NULL,
///     active_cap_per_board INTEGER NOT NULL,
///     archived_cap_per_user INTEGER NOT NULL,
///     archive_retention_days INTEGER NOT NULL,
///     cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
///     cancel_effective_at TIMESTAMPTZ,
///     courtesy_until TIMESTAMPTZ,
///     enforcement_state TEXT NOT NULL DEFAULT 'none',
///     current_period_end TIMESTAMPTZ,
///     upgraded_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # State Machine
///
/// ```text
/// free/active ──grant──▶ pro/active ──schedule──▶ pro/cancel_scheduled
///      ▲                     │                          │   │
///      │                     │ cancel now               │   └─undo─▶ pro/active
///      │                     ▼                          ▼ period end
///      └──courtesy over── free/grace (soft_warn) ◀──────┘
///                             │ courtesy over, still over limits
///                             ▼
///                        free/grace (enforced) ──resolve──▶ free/active
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Free tier: one board
    Free,

    /// Paid tier
    Pro,
}

impl Plan {
    /// Converts plan to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
        }
    }

    /// Parses plan from its stored form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Plan::Free),
            "pro" => Some(Plan::Pro),
            _ => None,
        }
    }
}

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// Normal operation
    Active,

    /// Pro until `cancel_effective_at`, then downgraded
    CancelScheduled,

    /// Downgraded, inside (or past) the courtesy window
    Grace,
}

impl EntitlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementStatus::Active => "active",
            EntitlementStatus::CancelScheduled => "cancel_scheduled",
            EntitlementStatus::Grace => "grace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EntitlementStatus::Active),
            "cancel_scheduled" => Some(EntitlementStatus::CancelScheduled),
            "grace" => Some(EntitlementStatus::Grace),
            _ => None,
        }
    }
}

/// Read-only lockdown level for over-limit content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementState {
    None,

    /// Over limit, content still writable during courtesy
    SoftWarn,

    /// Over limit after courtesy: board mutations are refused
    Enforced,
}

impl EnforcementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementState::None => "none",
            EnforcementState::SoftWarn => "soft_warn",
            EnforcementState::Enforced => "enforced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(EnforcementState::None),
            "soft_warn" => Some(EnforcementState::SoftWarn),
            "enforced" => Some(EnforcementState::Enforced),
            _ => None,
        }
    }
}

/// Resource caps attached to a plan
///
/// Free and Pro share the same per-board active task cap; only the board
/// count and archive limits differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum boards owned
    pub board_cap: u32,

    /// Maximum non-archived tasks on a single board
    pub active_cap_per_board: u32,

    /// Maximum archived tasks across all boards
    pub archived_cap_per_user: u32,

    /// Archived tasks older than this are pruned
    pub archive_retention_days: u32,
}

impl PlanLimits {
    /// Gets the caps for a plan
    pub fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => PlanLimits {
                board_cap: 1,
                active_cap_per_board: 100,
                archived_cap_per_user: 100,
                archive_retention_days: 30,
            },
            Plan::Pro => PlanLimits {
                board_cap: 500,
                active_cap_per_board: 100,
                archived_cap_per_user: 10_000,
                archive_retention_days: 365,
            },
        }
    }
}

/// Per-user entitlement record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub plan: Plan,
    pub status: EntitlementStatus,
    pub board_cap: u32,
    pub active_cap_per_board: u32,
    pub archived_cap_per_user: u32,
    pub archive_retention_days: u32,

    /// Set while a cancellation is scheduled for the period end
    pub cancel_at_period_end: bool,

    /// When a scheduled cancellation takes effect
    pub cancel_effective_at: Option<DateTime<Utc>>,

    /// End of the courtesy window after a cancellation
    pub courtesy_until: Option<DateTime<Utc>>,

    pub enforcement_state: EnforcementState,

    /// End of the current paid billing period
    pub current_period_end: Option<DateTime<Utc>>,

    /// Start of the current Pro term
    pub upgraded_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entitlement {
    /// Builds the default free-plan entitlement used for lazy provisioning
    pub fn free_default(user_id: Uuid, now: DateTime<Utc>) -> Self {
        let limits = PlanLimits::for_plan(Plan::Free);
        Entitlement {
            user_id,
            plan: Plan::Free,
            status: EntitlementStatus::Active,
            board_cap: limits.board_cap,
            active_cap_per_board: limits.active_cap_per_board,
            archived_cap_per_user: limits.archived_cap_per_user,
            archive_retention_days: limits.archive_retention_days,
            cancel_at_period_end: false,
            cancel_effective_at: None,
            courtesy_until: None,
            enforcement_state: EnforcementState::None,
            current_period_end: None,
            upgraded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Caps currently stored on the record
    pub fn limits(&self) -> PlanLimits {
        PlanLimits {
            board_cap: self.board_cap,
            active_cap_per_board: self.active_cap_per_board,
            archived_cap_per_user: self.archived_cap_per_user,
            archive_retention_days: self.archive_retention_days,
        }
    }

    /// Overwrites the stored caps
    pub fn apply_limits(&mut self, limits: PlanLimits) {
        self.board_cap = limits.board_cap;
        self.active_cap_per_board = limits.active_cap_per_board;
        self.archived_cap_per_user = limits.archived_cap_per_user;
        self.archive_retention_days = limits.archive_retention_days;
    }

    /// Whether board mutations are locked
    pub fn is_read_only(&self) -> bool {
        self.enforcement_state == EnforcementState::Enforced
    }

    /// Checks the record-level invariants
    ///
    /// - `cancel_at_period_end` implies `cancel_effective_at`
    /// - `status == grace` implies `courtesy_until`
    pub fn is_consistent(&self) -> bool {
        let cancel_ok = !self.cancel_at_period_end || self.cancel_effective_at.is_some();
        let grace_ok = self.status != EntitlementStatus::Grace || self.courtesy_until.is_some();
        cancel_ok && grace_ok
    }
}
