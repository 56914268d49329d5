//! `TaskStore`: the durable-persistence seam behind the Task Manager. Append-only terminal rows plus a "started"
//! ledger so a process restart can find tasks that never reached a terminal
//! state and mark them `interrupted` without silently resuming them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::task::TaskStatus;
use crate::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

/// The durable row persisted once a task reaches a terminal status.
#[derive(Debug, Clone)]
pub struct TerminalTaskRow {
    pub id: Uuid,
    pub url: String,
    pub status: TaskStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Durable persistence seam.
/// `record_started`/`load_unfinished` implement the restart-recovery contract:
/// a task recorded as started but never saved as terminal is discoverable on
/// the next `load_unfinished` call.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn record_started(&self, id: Uuid) -> Result<(), TaskStoreError>;
    async fn save_terminal(&self, row: TerminalTaskRow) -> Result<(), TaskStoreError>;
    async fn load_unfinished(&self) -> Result<Vec<Uuid>, TaskStoreError>;
}

/// SQLite-backed store (append-only `started`/`terminal` tables), matching the
/// corpus's existing `sqlx` (`runtime-tokio`, `sqlite`) dependency used for
/// link-index persistence.
pub struct SqliteTaskStore {
    pool: sqlx::SqlitePool,
}

impl SqliteTaskStore {
    pub async fn connect(path: &std::path::Path) -> Result<Self, TaskStoreError> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = sqlx::SqlitePool::connect(&url)
            .await
            .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_started (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_terminal (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                status TEXT NOT NULL,
                error_kind TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn record_started(&self, id: Uuid) -> Result<(), TaskStoreError> {
        sqlx::query("INSERT OR REPLACE INTO task_started (id, started_at) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn save_terminal(&self, row: TerminalTaskRow) -> Result<(), TaskStoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO task_terminal
                (id, url, status, error_kind, error_message, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id.to_string())
        .bind(&row.url)
        .bind(row.status.as_str())
        .bind(row.error_kind.map(ErrorKind::as_str))
        .bind(&row.error_message)
        .bind(row.created_at.to_rfc3339())
        .bind(row.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;

        sqlx::query("DELETE FROM task_started WHERE id = ?")
            .bind(row.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn load_unfinished(&self) -> Result<Vec<Uuid>, TaskStoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT s.id FROM task_started s
             LEFT JOIN task_terminal t ON s.id = t.id
             WHERE t.id IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(id,)| Uuid::parse_str(&id).ok())
            .collect())
    }
}

/// In-memory store for unit/integration tests.
#[derive(Default)]
pub struct TestTaskStore {
    started: parking_lot::Mutex<std::collections::HashSet<Uuid>>,
    terminal: parking_lot::Mutex<std::collections::HashMap<Uuid, TerminalTaskRow>>,
}

impl TestTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn terminal_row(&self, id: Uuid) -> Option<TerminalTaskRow> {
        self.terminal.lock().get(&id).cloned()
    }
}

#[async_trait]
impl TaskStore for TestTaskStore {
    async fn record_started(&self, id: Uuid) -> Result<(), TaskStoreError> {
        self.started.lock().insert(id);
        Ok(())
    }

    async fn save_terminal(&self, row: TerminalTaskRow) -> Result<(), TaskStoreError> {
        self.started.lock().remove(&row.id);
        self.terminal.lock().insert(row.id, row);
        Ok(())
    }

    async fn load_unfinished(&self) -> Result<Vec<Uuid>, TaskStoreError> {
        Ok(self.started.lock().iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unfinished_excludes_tasks_saved_as_terminal() {
        let store = TestTaskStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.record_started(a).await.unwrap();
        store.record_started(b).await.unwrap();
        store
            .save_terminal(TerminalTaskRow {
                id: a,
                url: "https://example.com".into(),
                status: TaskStatus::Completed,
                error_kind: None,
                error_message: None,
                created_at: Utc::now(),
                completed_at: Utc::now(),
            })
            .await
            .unwrap();

        let unfinished = store.load_unfinished().await.unwrap();
        assert_eq!(unfinished, vec![b]);
    }
}
