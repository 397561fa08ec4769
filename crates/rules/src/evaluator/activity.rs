//! Opt-in activity rules: recent reassignment, overdue due date, new tasks.

use chrono::{DateTime, Duration, Utc};
use nudge_core::{ReminderPayload, TaskSnapshot};

use crate::config::RuleConfig;
use crate::error::{Result, RuleError};
use crate::time::{local_today, parse_date, parse_timestamp};

/// Parse an optional timestamp field; blank means absent.
fn timestamp_field(
    task: &TaskSnapshot,
    field: &'static str,
    raw: Option<&str>,
    config: &RuleConfig,
) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    parse_timestamp(raw, config.local_offset())
        .map(Some)
        .ok_or_else(|| RuleError::malformed(&task.key, field, raw))
}

fn within(now: DateTime<Utc>, at: DateTime<Utc>, window: Duration) -> bool {
    let elapsed = now.signed_duration_since(at);
    elapsed >= Duration::zero() && elapsed <= window
}

pub(super) fn assignee_changed(
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
) -> Result<Option<ReminderPayload>> {
    let changed = timestamp_field(
        task,
        "last_assignee_changed_at",
        task.last_assignee_changed_at.as_deref(),
        config,
    )?;
    Ok(changed
        .filter(|at| within(now, *at, config.assignee_change_wait()))
        .map(|changed_at| ReminderPayload::AssigneeChanged { changed_at }))
}

pub(super) fn recently_created(
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
) -> Result<Option<ReminderPayload>> {
    let created = timestamp_field(task, "created_at", task.created_at.as_deref(), config)?;
    Ok(created
        .filter(|at| within(now, *at, config.created_wait()))
        .map(|created_at| ReminderPayload::RecentlyCreated { created_at }))
}

pub(super) fn due_date_overdue(
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
) -> Result<Option<ReminderPayload>> {
    let Some(raw) = task.due_date.as_deref().filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let local = config.local_offset();
    let due_date =
        parse_date(raw, local).ok_or_else(|| RuleError::malformed(&task.key, "due_date", raw))?;
    let today = local_today(now, local);
    if today <= due_date {
        return Ok(None);
    }
    Ok(Some(ReminderPayload::DueDateOverdue {
        due_date,
        days_overdue: (today - due_date).num_days(),
    }))
}
