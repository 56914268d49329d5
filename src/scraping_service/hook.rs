//! Optional post-extraction ML/annotation hook.

use async_trait::async_trait;

use crate::task_manager::TaskMetadata;

#[derive(Debug, Clone, thiserror::Error)]
#[error("post-process hook failed: {0}")]
pub struct HookError(pub String);

impl HookError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::ExtractionError
    }
}

/// Annotation produced by a [`PostProcessHook`]. Opaque to the orchestrator;
/// stashed as JSON on the task result for a caller to interpret.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub payload: serde_json::Value,
}

/// Optional post-extraction step (classification, entity extraction, etc.).
/// Absent a configured hook, step 7 of the request flow is skipped entirely
/// and `metadata.post_process_skipped` is set.
#[async_trait]
pub trait PostProcessHook: Send + Sync {
    async fn run(&self, content: &str, metadata: &TaskMetadata) -> Result<Annotation, HookError>;
}
