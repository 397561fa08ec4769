use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Counters for one scan cycle.
///
/// `attempted = sent + failed`; suppressed events are not attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// The `now` every rule and cooldown check in the cycle used.
    pub evaluated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks_fetched: usize,
    pub tasks_evaluated: usize,
    /// Tasks skipped because a field could not be interpreted.
    pub tasks_malformed: usize,
    /// Events the rule engine produced.
    pub events: usize,
    /// Events inside their cooldown.
    pub suppressed: usize,
    pub attempted: usize,
    pub sent: usize,
    /// Attempts without a successful delivery, `no_route` included.
    pub failed: usize,
    /// The part of `failed` that had no address to try.
    pub no_route: usize,
    /// Ledger reads or writes that failed.
    pub history_errors: usize,
}

impl CycleReport {
    pub(crate) fn new(cycle_id: Uuid, evaluated_at: DateTime<Utc>) -> Self {
        let started_at = Utc::now();
        Self {
            cycle_id,
            evaluated_at,
            started_at,
            finished_at: started_at,
            tasks_fetched: 0,
            tasks_evaluated: 0,
            tasks_malformed: 0,
            events: 0,
            suppressed: 0,
            attempted: 0,
            sent: 0,
            failed: 0,
            no_route: 0,
            history_errors: 0,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    pub fn log(&self) {
        tracing::info!(
            cycle_id = %self.cycle_id,
            tasks = self.tasks_fetched,
            malformed = self.tasks_malformed,
            events = self.events,
            suppressed = self.suppressed,
            attempted = self.attempted,
            sent = self.sent,
            failed = self.failed,
            no_route = self.no_route,
            history_errors = self.history_errors,
            duration_ms = self.duration_ms(),
            "scan cycle finished"
        );
    }
}
