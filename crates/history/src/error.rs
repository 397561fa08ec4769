/// Errors raised by history backends.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A ledger line other than the last one could not be parsed.
    #[error("corrupt history ledger at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    /// Another open ledger already holds the file.
    #[error("history ledger {} is in use by another process: {reason}", path.display())]
    Locked { path: std::path::PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, HistoryError>;
