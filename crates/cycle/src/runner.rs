//! One scan cycle: fetch, evaluate, claim, deliver, record.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use nudge_connector::TaskSource;
use nudge_core::{DeliveryStatus, ReminderEvent};
use nudge_history::HistoryStore;
use nudge_notify::{ReminderRenderer, RouteOutcome, Router};
use nudge_rules::RuleEngine;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::CycleError;
use crate::report::CycleReport;

/// What happened to one candidate event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    /// Inside the cooldown; not attempted.
    Suppressed,
    /// The ledger could not be read; not attempted.
    LookupFailed,
    Attempted { status: DeliveryStatus, recorded: bool },
}

/// Runs scan cycles. At most one cycle runs at a time per runner.
pub struct CycleRunner {
    source: Arc<dyn TaskSource>,
    engine: RuleEngine,
    history: Arc<HistoryStore>,
    router: Router,
    renderer: ReminderRenderer,
    /// Projects passed to the source; empty means the rule allow-list.
    projects: Vec<String>,
    max_concurrency: usize,
    running: Mutex<()>,
}

impl CycleRunner {
    pub fn new(
        source: Arc<dyn TaskSource>,
        engine: RuleEngine,
        history: Arc<HistoryStore>,
        router: Router,
        renderer: ReminderRenderer,
    ) -> Self {
        Self {
            source,
            engine,
            history,
            router,
            renderer,
            projects: Vec::new(),
            max_concurrency: 8,
            running: Mutex::new(()),
        }
    }

    pub fn with_projects(mut self, projects: Vec<String>) -> Self {
        self.projects = projects;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Run one cycle now.
    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle with a fixed evaluation time.
    ///
    /// Returns [`CycleError::AlreadyRunning`] without doing anything if another
    /// cycle holds this runner, and [`CycleError::Fetch`] if no snapshots could
    /// be fetched, in which case nothing is recorded.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let _running = self.running.try_lock().map_err(|_| CycleError::AlreadyRunning)?;
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id);
        self.run_locked(cycle_id, now).instrument(span).await
    }

    async fn run_locked(&self, cycle_id: Uuid, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let config = self.engine.config();
        let mut report = CycleReport::new(cycle_id, now);

        let projects = if self.projects.is_empty() {
            config.projects_allowed.clone()
        } else {
            self.projects.clone()
        };
        let since = now.checked_sub_signed(config.scan_window()).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let tasks = self.source.fetch(&projects, since).await.map_err(|e| {
            error!(source = self.source.source_name(), error = %e, "snapshot fetch failed, aborting cycle");
            CycleError::Fetch(e)
        })?;
        report.tasks_fetched = tasks.len();
        info!(source = self.source.source_name(), tasks = tasks.len(), since = %since, "fetched snapshots");

        let mut events = Vec::new();
        for task in &tasks {
            match self.engine.evaluate(task, now) {
                Ok(hits) => {
                    report.tasks_evaluated += 1;
                    events.extend(hits);
                }
                Err(e) => {
                    report.tasks_malformed += 1;
                    warn!(task = %task.key, error = %e, "skipping malformed task");
                }
            }
        }
        report.events = events.len();

        let cooldown = config.cooldown();
        let outcomes: Vec<EventOutcome> = stream::iter(events)
            .map(|event| self.process(event, now, cooldown))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                EventOutcome::Suppressed => report.suppressed += 1,
                EventOutcome::LookupFailed => report.history_errors += 1,
                EventOutcome::Attempted { status, recorded } => {
                    report.attempted += 1;
                    match status {
                        DeliveryStatus::Success => report.sent += 1,
                        DeliveryStatus::Failure => report.failed += 1,
                        DeliveryStatus::NoRoute => {
                            report.failed += 1;
                            report.no_route += 1;
                        }
                    }
                    if !recorded {
                        report.history_errors += 1;
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    async fn process(&self, event: ReminderEvent, now: DateTime<Utc>, cooldown: Duration) -> EventOutcome {
        let key = event.history_key();
        let claim = match self.history.claim(&key, now, cooldown).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                debug!(key = %key, "inside cooldown, skipping");
                return EventOutcome::Suppressed;
            }
            Err(e) => {
                error!(key = %key, error = %e, "history lookup failed, event not attempted");
                return EventOutcome::LookupFailed;
            }
        };

        let outcome = match self.renderer.render(&event) {
            Ok(text) => self.router.deliver(&event, &text).await,
            Err(e) => {
                warn!(key = %key, error = %e, "message rendering failed");
                RouteOutcome {
                    status: DeliveryStatus::Failure,
                    delivered_via: None,
                    attempts: 0,
                    summary: e.to_string(),
                }
            }
        };

        let status = outcome.status;
        let recorded = match claim.record(status, &outcome.summary) {
            Ok(_) => true,
            Err(e) => {
                error!(
                    key = %key,
                    status = %status,
                    error = %e,
                    reconciliation_risk = true,
                    "failed to record delivery attempt, the next cycle may send again"
                );
                false
            }
        };
        EventOutcome::Attempted { status, recorded }
    }
}
