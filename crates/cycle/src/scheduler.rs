//! Cycle trigger: cron expression or fixed interval, skip-if-running.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use nudge_core::config::ScheduleConfig;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::CycleError;
use crate::runner::CycleRunner;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// When the next cycle should start.
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron(Box<Schedule>),
    Interval(Duration),
}

impl Trigger {
    pub fn cron(expr: &str) -> Result<Self, CycleError> {
        let normalized = normalize_cron(expr);
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| CycleError::Schedule(format!("{expr:?}: {e}")))?;
        Ok(Self::Cron(Box::new(schedule)))
    }

    pub fn interval(every: Duration) -> Result<Self, CycleError> {
        if every.is_zero() {
            return Err(CycleError::Schedule("interval must be positive".into()));
        }
        Ok(Self::Interval(every))
    }

    /// Cron when configured, otherwise the interval.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, CycleError> {
        match config.cron.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(expr) => Self::cron(expr),
            None => Self::interval(Duration::from_secs(config.interval_minutes.saturating_mul(60))),
        }
    }

    /// First tick strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&after).next(),
            Self::Interval(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|d| after.checked_add_signed(d)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Cron(schedule) => format!("cron {schedule}"),
            Self::Interval(every) => format!("every {}s", every.as_secs()),
        }
    }
}

/// Run cycles on `trigger` until `shutdown` resolves.
///
/// Each tick spawns a cycle. A tick that arrives while the previous cycle is
/// still running is skipped by the runner's single-flight guard. On shutdown
/// the loop stops ticking and waits for the in-flight cycle.
pub async fn run_loop<F>(runner: Arc<CycleRunner>, trigger: Trigger, run_on_start: bool, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut inflight = JoinSet::new();
    info!(trigger = %trigger.describe(), run_on_start, "scheduler started");

    if run_on_start {
        spawn_cycle(&mut inflight, runner.clone());
    }

    loop {
        while inflight.try_join_next().is_some() {}

        let now = Utc::now();
        let Some(next) = trigger.next_after(now) else {
            warn!("schedule has no upcoming ticks, stopping");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        debug!(next = %next, wait_secs = wait.as_secs(), "waiting for next tick");

        tokio::select! {
            _ = tokio::time::sleep(wait) => spawn_cycle(&mut inflight, runner.clone()),
            _ = &mut shutdown => {
                info!("shutdown requested, stopping scheduler");
                break;
            }
        }
    }

    while let Some(joined) = inflight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "scan cycle task panicked");
        }
    }
    info!("scheduler stopped");
}

fn spawn_cycle(inflight: &mut JoinSet<()>, runner: Arc<CycleRunner>) {
    inflight.spawn(async move {
        match runner.run_once().await {
            Ok(report) => report.log(),
            Err(CycleError::AlreadyRunning) => {
                info!("previous scan cycle still running, skipping tick");
            }
            Err(e) => error!(error = %e, "scan cycle failed"),
        }
    });
}
