//! Release-driven rules: upcoming release reminder and overdue release alert.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use nudge_core::{FixVersion, ReminderPayload, TaskSnapshot};
use tracing::debug;

use crate::config::RuleConfig;
use crate::time::{local_today, parse_date, release_date_from_name};

/// Name-embedded `YYYYMMDD` first, then the tracker's release date.
fn release_date(task_key: &str, version: &FixVersion, local: FixedOffset) -> Option<NaiveDate> {
    if let Some(date) = release_date_from_name(&version.name) {
        return Some(date);
    }
    let date = version.release_date.as_deref().and_then(|raw| parse_date(raw, local));
    if date.is_none() {
        debug!(task = %task_key, version = %version.name, "fix version has no usable release date");
    }
    date
}

/// Dated fix-versions in list order.
fn dated_versions<'a>(
    task: &'a TaskSnapshot,
    local: FixedOffset,
) -> impl Iterator<Item = (&'a FixVersion, NaiveDate)> + 'a {
    task.fix_versions
        .iter()
        .filter_map(move |v| release_date(&task.key, v, local).map(|d| (v, d)))
}

/// Earliest date wins; `min_by_key` keeps the first of equal keys.
fn earliest<'a>(
    candidates: impl Iterator<Item = (&'a FixVersion, NaiveDate)>,
) -> Option<(&'a FixVersion, NaiveDate)> {
    candidates.min_by_key(|(_, date)| *date)
}

/// One reminder per task for the soonest release within `pre_version_days`.
pub(super) fn pre_version_reminder(
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
) -> Option<ReminderPayload> {
    if task.uat_done {
        return None;
    }
    let local = config.local_offset();
    let today = local_today(now, local);
    let window = config.pre_version_days;

    let (version, date) = earliest(dated_versions(task, local).filter(|(_, date)| {
        let days = (*date - today).num_days();
        (0..=window).contains(&days)
    }))?;

    Some(ReminderPayload::PreVersion {
        fix_version: version.name.clone(),
        release_date: date,
        days_until: (date - today).num_days(),
    })
}

/// Alert for the most overdue release the task has not reached production for.
pub(super) fn post_version_alert(
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
) -> Option<ReminderPayload> {
    if task.production_done {
        return None;
    }
    let local = config.local_offset();
    let today = local_today(now, local);

    let (version, date) = earliest(dated_versions(task, local).filter(|(_, date)| today > *date))?;

    Some(ReminderPayload::PostVersion {
        fix_version: version.name.clone(),
        release_date: date,
        days_overdue: (today - date).num_days(),
    })
}
