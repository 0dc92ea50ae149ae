/// Dense position bookkeeping for drag-and-drop
///
/// Active tasks of a column always occupy positions `0..n-1` in visual
/// order. Every function here is pure: it takes the current rows, computes
/// the target ordering and returns only the rows whose `(column_id,
/// position)` actually changed. Callers persist the result as one batch.
///
/// # Move Algorithm
///
/// ```text
/// source [A B C]   target [D E]      move C -> target, index 1
///
/// 1. remove C from source        [A B]
/// 2. splice at clamp(1, 0, 2)    [D C E]
/// 3. renumber both densely       A:0 B:1 | D:0 C:1 E:2
/// 4. emit changed rows only      C(target,1) E(target,2)
/// ```
///
/// `target_index = None` appends to the end of the target column. Within a
/// single column the index refers to the ordering after the moved task has
/// been taken out, so moving a task onto its own index is a no-op.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

use crate::models::board::Column;
use crate::models::task::{PositionUpdate, Task};
use crate::store::ColumnPositionUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("task {0} is not among the loaded tasks")]
    TaskNotFound(Uuid),

    #[error("column {0} is not among the loaded columns")]
    ColumnNotFound(Uuid),
}

/// Outcome of planning a task move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub task_id: Uuid,
    pub source_column: Uuid,
    pub target_column: Uuid,

    /// Final position of the moved task
    pub target_position: i32,

    /// Rows to persist; empty when the move changes nothing
    pub updates: Vec<PositionUpdate>,
}

impl MovePlan {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }
}

fn to_position(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

/// Active tasks of one column, by current position
fn column_order(tasks: &[Task], column_id: Uuid) -> Vec<&Task> {
    let mut ordered: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.column_id == column_id && !t.archived)
        .collect();
    ordered.sort_by_key(|t| t.position);
    ordered
}

/// Renumbers an ordering densely and returns the rows that moved
fn renumber(column_id: Uuid, ordered: &[&Task]) -> Vec<PositionUpdate> {
    ordered
        .iter()
        .enumerate()
        .filter_map(|(index, task)| {
            let position = to_position(index);
            (task.column_id != column_id || task.position != position).then_some(PositionUpdate {
                task_id: task.id,
                column_id,
                position,
            })
        })
        .collect()
}

/// Plans moving `task_id` into `target_column` at `target_index`
///
/// `tasks` must hold the active tasks of the source and target columns;
/// rows of other columns are ignored.
pub fn plan_move(
    tasks: &[Task],
    task_id: Uuid,
    target_column: Uuid,
    target_index: Option<usize>,
) -> Result<MovePlan, OrderingError> {
    let moving = tasks
        .iter()
        .find(|t| t.id == task_id && !t.archived)
        .ok_or(OrderingError::TaskNotFound(task_id))?;
    let source_column = moving.column_id;

    let mut source: Vec<&Task> = column_order(tasks, source_column);
    source.retain(|t| t.id != task_id);

    let mut updates = Vec::new();
    let mut target: Vec<&Task> = if source_column == target_column {
        std::mem::take(&mut source)
    } else {
        let target = column_order(tasks, target_column);
        updates.extend(renumber(source_column, &source));
        target
    };

    let index = target_index.unwrap_or(target.len()).min(target.len());
    target.insert(index, moving);
    updates.extend(renumber(target_column, &target));

    Ok(MovePlan {
        task_id,
        source_column,
        target_column,
        target_position: to_position(index),
        updates,
    })
}

/// Renumbers columns after tasks are taken out of them (archive, delete)
///
/// `tasks` holds the active tasks of every affected column, including the
/// removed ones.
pub fn compact_after_removal(tasks: &[Task], removed: &[Uuid]) -> Vec<PositionUpdate> {
    let mut columns: BTreeMap<Uuid, Vec<&Task>> = BTreeMap::new();
    for task in tasks.iter().filter(|t| !t.archived) {
        columns.entry(task.column_id).or_default().push(task);
    }

    columns
        .into_iter()
        .filter(|(_, col)| col.iter().any(|t| removed.contains(&t.id)))
        .flat_map(|(column_id, mut col)| {
            col.sort_by_key(|t| t.position);
            col.retain(|t| !removed.contains(&t.id));
            renumber(column_id, &col)
        })
        .collect()
}

/// Position a task receives when appended to a column
pub fn append_position(tasks: &[Task], column_id: Uuid) -> i32 {
    to_position(column_order(tasks, column_id).len())
}

/// Plans moving a column to `target_index` among its board's columns
pub fn plan_column_move(
    columns: &[Column],
    column_id: Uuid,
    target_index: usize,
) -> Result<Vec<ColumnPositionUpdate>, OrderingError> {
    let mut ordered: Vec<&Column> = columns.iter().collect();
    ordered.sort_by_key(|c| c.position);

    let from = ordered
        .iter()
        .position(|c| c.id == column_id)
        .ok_or(OrderingError::ColumnNotFound(column_id))?;
    let moving = ordered.remove(from);
    let index = target_index.min(ordered.len());
    ordered.insert(index, moving);

    Ok(renumber_columns(&ordered))
}

/// Renumbers the remaining columns after one is deleted
pub fn compact_columns_after_removal(columns: &[Column], removed: Uuid) -> Vec<ColumnPositionUpdate> {
    let mut ordered: Vec<&Column> = columns.iter().filter(|c| c.id != removed).collect();
    ordered.sort_by_key(|c| c.position);
    renumber_columns(&ordered)
}

fn renumber_columns(ordered: &[&Column]) -> Vec<ColumnPositionUpdate> {
    ordered
        .iter()
        .enumerate()
        .filter_map(|(index, column)| {
            let position = to_position(index);
            (column.position != position).then_some(ColumnPositionUpdate {
                column_id: column.id,
                position,
            })
        })
        .collect()
}

/// Picks the tasks to archive so that at most `cap` stay active
///
/// Oldest-created tasks go first.
pub fn select_excess_for_archival(tasks: &[Task], cap: u32) -> Vec<Uuid> {
    let mut active: Vec<&Task> = tasks.iter().filter(|t| !t.archived).collect();
    let excess = active.len().saturating_sub(cap as usize);
    if excess == 0 {
        return Vec::new();
    }
    active.sort_by_key(|t| (t.created_at, t.id));
    active.into_iter().take(excess).map(|t| t.id).collect()
}

/// Whether every column's active tasks occupy exactly `0..n-1`
pub fn is_dense(tasks: &[Task]) -> bool {
    let mut columns: BTreeMap<Uuid, Vec<i32>> = BTreeMap::new();
    for task in tasks.iter().filter(|t| !t.archived) {
        columns.entry(task.column_id).or_default().push(task.position);
    }
    columns.into_values().all(|mut positions| {
        positions.sort_unstable();
        positions
            .iter()
            .enumerate()
            .all(|(index, &p)| p == to_position(index))
    })
}

/// Applies updates to an in-memory task list
pub fn apply_updates(tasks: &mut [Task], updates: &[PositionUpdate]) {
    for update in updates {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == update.task_id) {
            task.column_id = update.column_id;
            task.position = update.position;
        }
    }
}
