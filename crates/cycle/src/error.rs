use nudge_connector::FetchError;

/// Errors that end a scan cycle before any event is processed.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The snapshot source failed; nothing was evaluated or recorded.
    #[error("snapshot fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Another cycle holds the single-flight guard.
    #[error("a scan cycle is already running")]
    AlreadyRunning,

    #[error("invalid schedule: {0}")]
    Schedule(String),
}
