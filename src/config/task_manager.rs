//! Task manager configuration.

#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Path to the SQLite database backing `TaskStore` (append-only terminal rows).
    pub sqlite_path: std::path::PathBuf,
    /// Page size used by `list()`.
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            sqlite_path: std::path::PathBuf::from("tasks.db"),
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

impl TaskManagerConfig {
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.sqlite_path = path.into();
        self
    }

    #[must_use]
    pub fn with_default_page_size(mut self, n: usize) -> Self {
        self.default_page_size = n;
        self
    }
}
