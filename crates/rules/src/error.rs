//! Error types for rule configuration and evaluation.

/// Errors that can occur while loading rule configuration or evaluating a task.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML/JSON parse error.
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Out-of-range or inconsistent configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// A snapshot field could not be interpreted; only that task is skipped.
    #[error("task {task_key}: malformed {field}: {value:?}")]
    MalformedField {
        task_key: String,
        field: &'static str,
        value: String,
    },
}

impl RuleError {
    pub(crate) fn malformed(task_key: &str, field: &'static str, value: &str) -> Self {
        RuleError::MalformedField {
            task_key: task_key.to_string(),
            field,
            value: value.to_string(),
        }
    }
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
