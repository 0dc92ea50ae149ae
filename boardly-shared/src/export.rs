/// Board export (CSV and JSON)
///
/// Requesting an export issues a one-time download token. A single-board
/// export is ready immediately; a full-account export is queued as
/// `pending` and marked ready by the worker. Downloading consumes the token
/// and renders the file from the current board contents.
///
/// # CSV Layout
///
/// ```text
/// board,column,title,description,category,position,archived,created_at
/// Launch,To Do,Write docs,,docs,0,false,2025-01-01T00:00:00+00:00
/// ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::token::{generate_export_token, hash_token, validate_token_format};
use crate::models::board::{Board, Column};
use crate::models::export_token::{ConsumeOutcome, ExportStatus, ExportToken, ExportType};
use crate::models::task::Task;
use crate::store::{Store, StoreError};

const CSV_HEADER: &str = "board,column,title,description,category,position,archived,created_at";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("board not found")]
    BoardNotFound,

    #[error("export token not found")]
    TokenNotFound,

    /// Used or expired
    #[error("export link is no longer valid")]
    Gone,

    #[error("export is still being prepared")]
    NotReady,

    #[error("failed to render export: {0}")]
    Render(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Response to an export request; the token is only ever shown here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportTicket {
    pub token: String,
    pub status: ExportStatus,
    pub export_type: ExportType,
    pub board_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

/// Rendered export file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
struct ExportedColumn {
    title: String,
    position: i32,
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
struct ExportedBoard {
    id: Uuid,
    title: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    columns: Vec<ExportedColumn>,
}

#[derive(Debug, Clone, Serialize)]
struct ExportDocument {
    exported_at: DateTime<Utc>,
    boards: Vec<ExportedBoard>,
}

#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn Store>,
}

impl ExportService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ExportService { store }
    }

    /// Issues a download token
    pub async fn request(
        &self,
        user_id: Uuid,
        export_type: ExportType,
        board_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ExportTicket, ExportError> {
        if let Some(board_id) = board_id {
            match self.store.find_board(board_id).await? {
                Some(board) if board.user_id == user_id => {}
                _ => return Err(ExportError::BoardNotFound),
            }
        }

        let status = if board_id.is_some() {
            ExportStatus::Ready
        } else {
            ExportStatus::Pending
        };
        let (token, hash) = generate_export_token();
        let record = ExportToken::issue(hash, user_id, export_type, board_id, status, now);
        self.store.insert_export_token(&record).await?;

        info!(
            user_id = %user_id,
            export_id = %record.id,
            export_type = export_type.as_str(),
            status = status.as_str(),
            "Export requested"
        );

        Ok(ExportTicket {
            token,
            status,
            export_type,
            board_id,
            expires_at: record.expires_at,
        })
    }

    /// Marks queued exports ready; returns how many were prepared
    pub async fn prepare_pending(&self, now: DateTime<Utc>) -> Result<usize, ExportError> {
        let pending = self.store.list_pending_exports(now).await?;
        let mut prepared = 0;
        for export in pending {
            let url = ExportToken::file_url_for(export.id, export.export_type);
            match self.store.mark_export_ready(export.id, &url).await {
                Ok(()) => prepared += 1,
                Err(e) => warn!(export_id = %export.id, error = %e, "Failed to prepare export"),
            }
        }
        Ok(prepared)
    }

    /// Consumes a token and renders its file
    ///
    /// The token is spent even if rendering fails afterwards.
    pub async fn download(&self, token: &str, now: DateTime<Utc>) -> Result<ExportFile, ExportError> {
        if !validate_token_format(token) {
            return Err(ExportError::TokenNotFound);
        }

        let record = match self.store.consume_export_token(&hash_token(token), now).await? {
            ConsumeOutcome::Consumed(record) => record,
            ConsumeOutcome::NotFound => return Err(ExportError::TokenNotFound),
            ConsumeOutcome::AlreadyUsed | ConsumeOutcome::Expired => return Err(ExportError::Gone),
            ConsumeOutcome::NotReady => return Err(ExportError::NotReady),
        };

        let boards = self.collect(&record).await?;
        let body = match record.export_type {
            ExportType::Csv => render_csv(&boards),
            ExportType::Json => render_json(boards, now)?,
        };

        info!(user_id = %record.user_id, export_id = %record.id, "Export downloaded");

        Ok(ExportFile {
            filename: format!("boardly-export-{}.{}", now.format("%Y%m%d"), record.export_type.as_str()),
            content_type: record.export_type.content_type(),
            body,
        })
    }

    async fn collect(&self, record: &ExportToken) -> Result<Vec<ExportedBoard>, ExportError> {
        let boards: Vec<Board> = match record.board_id {
            Some(id) => self.store.find_board(id).await?.into_iter().collect(),
            None => self.store.list_boards(record.user_id).await?,
        };

        let mut exported = Vec::with_capacity(boards.len());
        for board in boards.into_iter().filter(|b| b.user_id == record.user_id) {
            let columns = self.store.list_columns(board.id).await?;
            let mut tasks = self.store.list_board_tasks(board.id, false).await?;
            tasks.extend(self.store.list_board_tasks(board.id, true).await?);
            exported.push(shape_board(board, columns, tasks));
        }
        Ok(exported)
    }
}

fn shape_board(board: Board, mut columns: Vec<Column>, tasks: Vec<Task>) -> ExportedBoard {
    columns.sort_by_key(|c| c.position);
    let columns = columns
        .into_iter()
        .map(|column| {
            let mut col_tasks: Vec<Task> = tasks
                .iter()
                .filter(|t| t.column_id == column.id)
                .cloned()
                .collect();
            col_tasks.sort_by_key(|t| (t.archived, t.position));
            ExportedColumn {
                title: column.title,
                position: column.position,
                tasks: col_tasks,
            }
        })
        .collect();

    ExportedBoard {
        id: board.id,
        title: board.title,
        description: board.description,
        created_at: board.created_at,
        columns,
    }
}

/// Quotes a CSV field when it holds a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_csv(boards: &[ExportedBoard]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for board in boards {
        for column in &board.columns {
            for task in &column.tasks {
                let row = [
                    csv_field(&board.title),
                    csv_field(&column.title),
                    csv_field(&task.title),
                    csv_field(task.description.as_deref().unwrap_or("")),
                    csv_field(&task.category),
                    task.position.to_string(),
                    task.archived.to_string(),
                    task.created_at.to_rfc3339(),
                ];
                out.push_str(&row.join(","));
                out.push('\n');
            }
        }
    }
    out
}

fn render_json(boards: Vec<ExportedBoard>, now: DateTime<Utc>) -> serde_json::Result<String> {
    let doc = ExportDocument {
        exported_at: now,
        boards,
    };
    serde_json::to_string_pretty(&doc)
}
