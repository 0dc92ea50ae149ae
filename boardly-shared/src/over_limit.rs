/// Over-limit resolution wizard
///
/// A downgraded user keeps one primary board. Every other board is deleted
/// together with its tasks, and if the primary board still holds more active
/// tasks than the free cap, the oldest-created excess tasks are archived.
/// On completion the enforcement state returns to `none`.
///
/// [`OverLimitService::preview`] computes the same plan without writing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::audit::SubscriptionEvent;
use crate::models::entitlement::{EnforcementState, Plan};
use crate::ordering::{compact_after_removal, select_excess_for_archival};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum OverLimitError {
    #[error("board not found")]
    BoardNotFound,

    #[error("over-limit resolution only applies to the free plan")]
    NotFreePlan,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub id: Uuid,
    pub title: String,
}

/// What resolving would (or did) do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverLimitPlan {
    pub primary_board_id: Uuid,
    pub boards_to_delete: Vec<BoardSummary>,
    pub tasks_to_archive: Vec<Uuid>,

    /// Active tasks left on the primary board
    pub active_after: u32,
}

#[derive(Clone)]
pub struct OverLimitService {
    store: Arc<dyn Store>,
}

impl OverLimitService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        OverLimitService { store }
    }

    pub async fn preview(
        &self,
        user_id: Uuid,
        primary_board_id: Uuid,
    ) -> Result<OverLimitPlan, OverLimitError> {
        let ent = self.store.get_or_create_entitlement(user_id).await?;
        if ent.plan != Plan::Free {
            return Err(OverLimitError::NotFreePlan);
        }

        match self.store.find_board(primary_board_id).await? {
            Some(board) if board.user_id == user_id => {}
            _ => return Err(OverLimitError::BoardNotFound),
        }

        let boards_to_delete = self
            .store
            .list_boards(user_id)
            .await?
            .into_iter()
            .filter(|b| b.id != primary_board_id)
            .map(|b| BoardSummary {
                id: b.id,
                title: b.title,
            })
            .collect();

        let active = self.store.list_board_tasks(primary_board_id, false).await?;
        let tasks_to_archive = select_excess_for_archival(&active, ent.active_cap_per_board);
        let active_after = (active.len() - tasks_to_archive.len()) as u32;

        Ok(OverLimitPlan {
            primary_board_id,
            boards_to_delete,
            tasks_to_archive,
            active_after,
        })
    }

    pub async fn resolve(
        &self,
        user_id: Uuid,
        primary_board_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<OverLimitPlan, OverLimitError> {
        let plan = self.preview(user_id, primary_board_id).await?;

        for board in &plan.boards_to_delete {
            self.store.delete_board(board.id).await?;
            info!(user_id = %user_id, board_id = %board.id, "Deleted board while resolving over-limit");
        }

        if !plan.tasks_to_archive.is_empty() {
            let active = self.store.list_board_tasks(primary_board_id, false).await?;
            let updates = compact_after_removal(&active, &plan.tasks_to_archive);
            self.store
                .archive_tasks(&plan.tasks_to_archive, now, &updates)
                .await?;
        }

        let mut ent = self.store.get_or_create_entitlement(user_id).await?;
        ent.enforcement_state = EnforcementState::None;
        self.store.save_entitlement(&ent).await?;

        info!(
            user_id = %user_id,
            deleted_boards = plan.boards_to_delete.len(),
            archived_tasks = plan.tasks_to_archive.len(),
            "Over-limit state resolved"
        );

        let event = SubscriptionEvent::new(
            Some(user_id),
            "over_limit_resolved",
            json!({
                "primary_board_id": primary_board_id,
                "deleted_boards": plan.boards_to_delete.len(),
                "archived_tasks": plan.tasks_to_archive.len(),
            }),
        );
        if let Err(e) = self.store.record_subscription_event(&event).await {
            warn!(user_id = %user_id, error = %e, "Failed to record subscription event");
        }

        Ok(plan)
    }
}
