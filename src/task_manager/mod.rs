//! Task registry: lifecycle, progress, persistence, cancellation.
//!
//! Grounds: the per-task `parking_lot::RwLock` guarding only field updates
//! (never held across an `.await`) follows the same discipline
//! `browser_pool::Inner` uses its `tokio::Mutex` for — short critical
//! sections, I/O happens outside the lock. Persistence follows `cache`'s
//! "failures in one tier don't fail the other" shape: a `TaskStore` failure is
//! logged, never returned to the caller, since the in-memory registry is the
//! source of truth for a live process.

mod store;
mod task;

pub use store::{SqliteTaskStore, TaskStore, TaskStoreError, TerminalTaskRow};
pub use task::{TaskErrorInfo, TaskMetadata, TaskRecord, TaskResult, TaskSpec, TaskStatus};
pub use store::TestTaskStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::config::{Priority, TaskManagerConfig};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(Uuid),
    #[error("task {0} is already in a terminal state")]
    Terminal(Uuid),
    #[error("invalid transition for task {0}: {1:?} -> {2:?}")]
    InvalidTransition(Uuid, TaskStatus, TaskStatus),
    #[error("progress must not decrease for task {0}")]
    ProgressWouldDecrease(Uuid),
}

struct TaskCell {
    record: RwLock<TaskRecord>,
    cancelled: AtomicBool,
}

/// Filter predicate for [`TaskManager::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

impl TaskFilter {
    fn matches(&self, record: &TaskRecord) -> bool {
        self.status.is_none_or(|s| s == record.status)
            && self.priority.is_none_or(|p| p == record.priority)
    }
}

/// Stable sort key for [`TaskManager::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    CreatedAtAsc,
    CreatedAtDesc,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Authoritative task registry. Safe to share behind an `Arc`; every
/// method takes `&self`.
pub struct TaskManager {
    config: TaskManagerConfig,
    tasks: DashMap<Uuid, Arc<TaskCell>>,
    store: Arc<dyn TaskStore>,
}

impl TaskManager {
    #[must_use]
    pub fn new(config: TaskManagerConfig, store: Arc<dyn TaskStore>) -> Self {
        Self {
            config,
            tasks: DashMap::new(),
            store,
        }
    }

    /// Allocate an id, persist the task in `pending`, and return immediately.
    /// `record_started` is flushed to the store in the background: a crash
    /// before it lands simply means this task is absent from the next
    /// `recover()` pass, which is no worse than the task never having been
    /// created.
    #[must_use]
    pub fn create(&self, spec: TaskSpec) -> Uuid {
        let id = Uuid::new_v4();
        let record = TaskRecord::new(id, &spec, Utc::now());
        self.tasks.insert(
            id,
            Arc::new(TaskCell {
                record: RwLock::new(record),
                cancelled: AtomicBool::new(false),
            }),
        );

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.record_started(id).await {
                warn!(task_id = %id, error = %e, "failed to record task start");
            }
        });

        id
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Result<TaskRecord, TaskError> {
        self.tasks
            .get(&id)
            .map(|cell| cell.record.read().clone())
            .ok_or(TaskError::NotFound(id))
    }

    #[must_use]
    pub fn is_cancelled(&self, id: Uuid) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|cell| cell.cancelled.load(Ordering::Acquire))
    }

    /// Atomic; rejected if the task is terminal; must never lower `progress`.
    pub fn update_progress(&self, id: Uuid, pct: u8, msg: impl Into<String>) -> Result<(), TaskError> {
        let cell = self.tasks.get(&id).ok_or(TaskError::NotFound(id))?;
        let mut record = cell.record.write();
        if record.status.is_terminal() {
            return Err(TaskError::Terminal(id));
        }
        if pct < record.progress {
            return Err(TaskError::ProgressWouldDecrease(id));
        }
        record.progress = pct;
        record.progress_message = msg.into();
        Ok(())
    }

    /// Apply `f` to the task's metadata in place. Used by the orchestrator to
    /// record `cache_hit`/`llm_skipped`/`browser_id`/etc. as a task progresses,
    /// ahead of its eventual `complete`/`fail`.
    pub fn update_metadata(&self, id: Uuid, f: impl FnOnce(&mut TaskMetadata)) -> Result<(), TaskError> {
        let cell = self.tasks.get(&id).ok_or(TaskError::NotFound(id))?;
        f(&mut cell.record.write().metadata);
        Ok(())
    }

    /// Enforces the task status state machine; rejected on an invalid edge.
    pub fn transition(&self, id: Uuid, next: TaskStatus) -> Result<(), TaskError> {
        let cell = self.tasks.get(&id).ok_or(TaskError::NotFound(id))?;
        let mut record = cell.record.write();
        if !record.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition(id, record.status, next));
        }
        if record.status == TaskStatus::Pending {
            record.started_at = Some(Utc::now());
        }
        record.status = next;
        Ok(())
    }

    /// `status=completed, progress=100`; terminal; flushed to durable storage.
    pub async fn complete(&self, id: Uuid, result: TaskResult) -> Result<(), TaskError> {
        self.finish(id, TaskStatus::Completed, Some(result), None).await
    }

    /// `status=failed`; terminal; flushed to durable storage.
    pub async fn fail(&self, id: Uuid, error: TaskErrorInfo) -> Result<(), TaskError> {
        self.finish(id, TaskStatus::Failed, None, Some(error)).await
    }

    /// If non-terminal: mark `cancelled`, raise the cancellation flag any
    /// worker holding the task observes at its next checkpoint. Idempotent —
    /// cancelling an already-terminal task is a no-op, not an error.
    pub async fn cancel(&self, id: Uuid) -> Result<(), TaskError> {
        let Some(cell) = self.tasks.get(&id).map(|c| Arc::clone(&c)) else {
            return Err(TaskError::NotFound(id));
        };
        cell.cancelled.store(true, Ordering::Release);

        let already_terminal = cell.record.read().status.is_terminal();
        if already_terminal {
            return Ok(());
        }

        self.finish(id, TaskStatus::Cancelled, None, None).await
    }

    async fn finish(
        &self,
        id: Uuid,
        status: TaskStatus,
        result: Option<TaskResult>,
        error: Option<TaskErrorInfo>,
    ) -> Result<(), TaskError> {
        let cell = self.tasks.get(&id).map(|c| Arc::clone(&c)).ok_or(TaskError::NotFound(id))?;

        let row = {
            let mut record = cell.record.write();
            if !record.status.can_transition_to(status) {
                return Err(TaskError::InvalidTransition(id, record.status, status));
            }
            record.status = status;
            record.completed_at = Some(Utc::now());
            if status == TaskStatus::Completed {
                record.progress = 100;
            }
            record.result = result;
            record.error = error.clone();

            TerminalTaskRow {
                id,
                url: record.url.clone(),
                status,
                error_kind: error.as_ref().map(|e| e.kind),
                error_message: error.as_ref().map(|e| e.message.clone()),
                created_at: record.created_at,
                completed_at: record.completed_at.unwrap_or_else(Utc::now),
            }
        };

        if let Err(e) = self.store.save_terminal(row).await {
            warn!(task_id = %id, error = %e, "failed to persist terminal task");
        }
        Ok(())
    }

    /// Paginated listing with stable sort keys.
    #[must_use]
    pub fn list(&self, filter: &TaskFilter, sort: TaskSort, page: usize) -> Page<TaskRecord> {
        let mut matching: Vec<TaskRecord> = self
            .tasks
            .iter()
            .map(|entry| entry.value().record.read().clone())
            .filter(|record| filter.matches(record))
            .collect();

        matching.sort_by(|a, b| match sort {
            TaskSort::CreatedAtAsc => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
            TaskSort::CreatedAtDesc => b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)),
        });

        let total = matching.len();
        let page_size = self.config.default_page_size.min(self.config.max_page_size).max(1);
        let start = page.saturating_mul(page_size).min(total);
        let end = (start + page_size).min(total);

        Page {
            items: matching[start..end].to_vec(),
            total,
        }
    }

    /// On process restart: tasks the store recorded as started but never
    /// terminal are marked `failed` with reason `interrupted` and never
    /// silently resumed.
    pub async fn recover(&self) -> Result<usize, TaskStoreError> {
        let unfinished = self.store.load_unfinished().await?;
        for id in &unfinished {
            let row = TerminalTaskRow {
                id: *id,
                url: String::new(),
                status: TaskStatus::Failed,
                error_kind: Some(crate::error::ErrorKind::Interrupted),
                error_message: Some("task was non-terminal across a process restart".to_string()),
                created_at: Utc::now(),
                completed_at: Utc::now(),
            };
            if let Err(e) = self.store.save_terminal(row).await {
                warn!(task_id = %id, error = %e, "failed to persist interrupted task");
            }
        }
        Ok(unfinished.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::time::Duration;

    fn spec() -> TaskSpec {
        TaskSpec {
            url: "https://example.com/a".into(),
            output_format: OutputFormat::Markdown,
            use_llm: false,
            use_cache: true,
            custom_instructions: None,
            priority: Priority::Normal,
        }
    }

    fn manager() -> TaskManager {
        TaskManager::new(TaskManagerConfig::default(), Arc::new(TestTaskStore::new()))
    }

    #[test]
    fn create_then_get_returns_pending_zero_progress() {
        let manager = manager();
        let id = manager.create(spec());
        let record = manager.get(id).unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn get_unknown_task_is_not_found() {
        let manager = manager();
        assert!(matches!(manager.get(Uuid::new_v4()), Err(TaskError::NotFound(_))));
    }

    #[test]
    fn progress_cannot_decrease() {
        let manager = manager();
        let id = manager.create(spec());
        manager.update_progress(id, 50, "halfway").unwrap();
        assert!(matches!(
            manager.update_progress(id, 10, "oops"),
            Err(TaskError::ProgressWouldDecrease(_))
        ));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let manager = manager();
        let id = manager.create(spec());
        assert!(matches!(
            manager.transition(id, TaskStatus::Extracting),
            Err(TaskError::InvalidTransition(..))
        ));
    }

    #[tokio::test]
    async fn completing_sets_progress_100_and_is_terminal() {
        let manager = manager();
        let id = manager.create(spec());
        manager.transition(id, TaskStatus::Initializing).unwrap();
        manager.transition(id, TaskStatus::AcquiringBrowser).unwrap();
        manager.transition(id, TaskStatus::Extracting).unwrap();
        manager.transition(id, TaskStatus::PostProcessing).unwrap();
        manager
            .complete(
                id,
                TaskResult {
                    content: "hello".into(),
                    output_format: OutputFormat::Markdown,
                },
            )
            .await
            .unwrap();

        let record = manager.get(id).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn terminal_task_rejects_further_progress_updates() {
        let manager = manager();
        let id = manager.create(spec());
        manager.fail(id, TaskErrorInfo::new(crate::error::ErrorKind::InvalidUrl, "bad url")).await.unwrap();
        assert!(matches!(
            manager.update_progress(id, 10, "nope"),
            Err(TaskError::Terminal(_))
        ));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let manager = manager();
        let id = manager.create(spec());
        manager.cancel(id).await.unwrap();
        manager.cancel(id).await.unwrap();
        assert_eq!(manager.get(id).unwrap().status, TaskStatus::Cancelled);
        assert!(manager.is_cancelled(id));
    }

    #[tokio::test]
    async fn cancel_flag_is_observable_immediately() {
        let manager = manager();
        let id = manager.create(spec());
        assert!(!manager.is_cancelled(id));
        manager.cancel(id).await.unwrap();
        assert!(manager.is_cancelled(id));
    }

    #[test]
    fn list_paginates_in_stable_creation_order() {
        let manager = manager();
        let ids: Vec<_> = (0..5).map(|_| manager.create(spec())).collect();
        std::thread::sleep(Duration::from_millis(2));

        let page0 = manager.list(&TaskFilter::default(), TaskSort::CreatedAtAsc, 0);
        assert_eq!(page0.total, 5);
        assert_eq!(page0.items.first().unwrap().id, ids[0]);
    }

    #[test]
    fn update_metadata_mutates_in_place() {
        let manager = manager();
        let id = manager.create(spec());
        manager.update_metadata(id, |m| m.cache_hit = true).unwrap();
        assert!(manager.get(id).unwrap().metadata.cache_hit);
    }

    #[tokio::test]
    async fn recover_marks_unfinished_tasks_interrupted() {
        let store = Arc::new(TestTaskStore::new());
        let id = Uuid::new_v4();
        store.record_started(id).await.unwrap();

        let manager = TaskManager::new(TaskManagerConfig::default(), store.clone());
        let recovered = manager.recover().await.unwrap();
        assert_eq!(recovered, 1);

        let row = store.terminal_row(id).unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert_eq!(row.error_kind, Some(crate::error::ErrorKind::Interrupted));
    }
}
