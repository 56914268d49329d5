//! Task data model and state machine.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{OutputFormat, Priority};
use crate::error::ErrorKind;

/// Directed, acyclic (save for its terminal sinks) task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Initializing,
    AcquiringBrowser,
    Extracting,
    ProcessingLlm,
    PostProcessing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal edge in the task status DAG. Any non-terminal
    /// status may transition to `Failed` or `Cancelled`; the happy path is a
    /// single forward chain with `ProcessingLlm` optional.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Failed | Self::Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Initializing)
                | (Self::Initializing, Self::AcquiringBrowser)
                | (Self::AcquiringBrowser, Self::Extracting)
                | (Self::Extracting, Self::ProcessingLlm)
                | (Self::Extracting, Self::PostProcessing)
                | (Self::ProcessingLlm, Self::PostProcessing)
                | (Self::PostProcessing, Self::Completed)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initializing => "initializing",
            Self::AcquiringBrowser => "acquiring_browser",
            Self::Extracting => "extracting",
            Self::ProcessingLlm => "processing_llm",
            Self::PostProcessing => "post_processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Request shape accepted by [`super::TaskManager::create`].
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub url: String,
    pub output_format: OutputFormat,
    pub use_llm: bool,
    pub use_cache: bool,
    pub custom_instructions: Option<String>,
    pub priority: Priority,
}

/// Structured payload produced on `completed`.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub content: String,
    pub output_format: OutputFormat,
}

/// Taxonomy code plus message produced on `failed`.
#[derive(Debug, Clone)]
pub struct TaskErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after: Option<std::time::Duration>,
}

impl TaskErrorInfo {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: std::time::Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Execution metadata accumulated across the task lifecycle.
#[derive(Debug, Clone, Default)]
pub struct TaskMetadata {
    pub execution_time_ms: Option<u64>,
    pub content_length: Option<usize>,
    pub word_count: Option<usize>,
    pub cache_hit: bool,
    pub browser_id: Option<String>,
    pub llm_provider_id: Option<String>,
    pub llm_skipped: bool,
    pub post_process_skipped: bool,
}

/// Full task record held by the [`super::TaskManager`] registry. Cloning
/// produces a consistent point-in-time snapshot.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: Uuid,
    pub url: String,
    pub output_format: OutputFormat,
    pub use_llm: bool,
    pub use_cache: bool,
    pub custom_instructions: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub progress: u8,
    pub progress_message: String,
    pub result: Option<TaskResult>,
    pub error: Option<TaskErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: TaskMetadata,
}

impl TaskRecord {
    #[must_use]
    pub fn new(id: Uuid, spec: &TaskSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            url: spec.url.clone(),
            output_format: spec.output_format,
            use_llm: spec.use_llm,
            use_cache: spec.use_cache,
            custom_instructions: spec.custom_instructions.clone(),
            priority: spec.priority,
            status: TaskStatus::Pending,
            progress: 0,
            progress_message: "queued".to_string(),
            result: None,
            error: None,
            created_at,
            started_at: None,
            completed_at: None,
            metadata: TaskMetadata::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_chain_is_legal() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Initializing));
        assert!(TaskStatus::Initializing.can_transition_to(TaskStatus::AcquiringBrowser));
        assert!(TaskStatus::AcquiringBrowser.can_transition_to(TaskStatus::Extracting));
        assert!(TaskStatus::Extracting.can_transition_to(TaskStatus::ProcessingLlm));
        assert!(TaskStatus::ProcessingLlm.can_transition_to(TaskStatus::PostProcessing));
        assert!(TaskStatus::PostProcessing.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn llm_step_is_skippable() {
        assert!(TaskStatus::Extracting.can_transition_to(TaskStatus::PostProcessing));
    }

    #[test]
    fn no_back_edges() {
        assert!(!TaskStatus::Extracting.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::PostProcessing.can_transition_to(TaskStatus::AcquiringBrowser));
    }

    #[test]
    fn terminal_states_accept_nothing_further() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(!terminal.can_transition_to(TaskStatus::Pending));
            assert!(!terminal.can_transition_to(TaskStatus::Failed));
            assert!(!terminal.can_transition_to(TaskStatus::Completed));
        }
    }

    #[test]
    fn any_non_terminal_can_fail_or_cancel() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Initializing,
            TaskStatus::AcquiringBrowser,
            TaskStatus::Extracting,
            TaskStatus::ProcessingLlm,
            TaskStatus::PostProcessing,
        ] {
            assert!(status.can_transition_to(TaskStatus::Failed));
            assert!(status.can_transition_to(TaskStatus::Cancelled));
        }
    }
}
