use chrono::{DateTime, Utc};
use nudge_core::{ReminderPayload, TaskSnapshot};
use tracing::debug;

use crate::config::RuleConfig;
use crate::error::{Result, RuleError};
use crate::time::parse_timestamp;

/// Task sits in a CI-testing status with no worklog for at least
/// `ci_testing_wait_minutes`.
///
/// An unknown transition time counts as "waited long enough"; an unparseable
/// one is a malformed field.
pub(super) fn missing_logtime(
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
) -> Result<Option<ReminderPayload>> {
    if task.has_worklog || !config.is_ci_testing_status(&task.status) {
        return Ok(None);
    }

    let Some(raw) = task.last_status_changed_at.as_deref().filter(|s| !s.trim().is_empty()) else {
        debug!(task = %task.key, "status change time unknown, treating wait as elapsed");
        return Ok(Some(ReminderPayload::MissingLogtime { waited_minutes: None }));
    };

    let changed = parse_timestamp(raw, config.local_offset())
        .ok_or_else(|| RuleError::malformed(&task.key, "last_status_changed_at", raw))?;
    let waited = now.signed_duration_since(changed);
    if waited < config.ci_testing_wait() {
        return Ok(None);
    }
    Ok(Some(ReminderPayload::MissingLogtime {
        waited_minutes: Some(waited.num_minutes()),
    }))
}
