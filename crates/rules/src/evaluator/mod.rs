//! Rule evaluation over a single task snapshot.
//!
//! Each rule is a pure function of `(task, now, config)` returning an optional
//! payload. [`evaluate`] runs every applicable rule, resolves the logical
//! recipient for each hit and adds leader escalations. Nothing here touches the
//! history ledger or the network.

mod activity;
mod description;
mod logtime;
mod version;


use std::sync::Arc;

use chrono::{DateTime, Utc};
use nudge_core::{Directory, RecipientRole, ReminderEvent, ReminderPayload, RuleKind, TaskSnapshot};
use tracing::debug;

use crate::config::RuleConfig;
use crate::error::Result;

// ── Engine ──────────────────────────────────────────────────────────

/// Rule configuration plus the identity directory used for escalations.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: Arc<RuleConfig>,
    directory: Arc<Directory>,
}

impl RuleEngine {
    pub fn new(config: RuleConfig, directory: Arc<Directory>) -> Self {
        Self {
            config: Arc::new(config),
            directory,
        }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Evaluate every applicable rule for `task` at `now`.
    pub fn evaluate(&self, task: &TaskSnapshot, now: DateTime<Utc>) -> Result<Vec<ReminderEvent>> {
        evaluate(task, now, &self.config, &self.directory)
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Run all enabled rules against `task`.
///
/// An `Err` means one of the task's fields is malformed; the caller skips the
/// whole task. Tasks outside the project allow-list produce no events.
pub fn evaluate(
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
    directory: &Directory,
) -> Result<Vec<ReminderEvent>> {
    let project = task.project_key();
    if !config.project_allowed(&project) {
        debug!(task = %task.key, project = %project, "project not in allow-list");
        return Ok(Vec::new());
    }

    let mut events = Vec::new();
    for kind in RuleKind::ALL {
        if !config.rule_applies(kind, &project) {
            continue;
        }
        let Some(payload) = evaluate_rule(kind, task, now, config)? else {
            continue;
        };

        let role = primary_role(kind);
        let Some(recipient) = resolve_recipient(task, role) else {
            debug!(task = %task.key, rule = %kind, "no assignee or reporter, dropping");
            continue;
        };

        // escalation follows the assignee's leader, never a fallback recipient's
        let escalate_to = if kind == RuleKind::PostVersionAlert
            && task.assignee_identity().as_deref() == Some(recipient.as_str())
        {
            directory.leader_of(&recipient).filter(|leader| *leader != recipient)
        } else {
            None
        };

        push_event(&mut events, config, task, now, kind, role, recipient, payload.clone());
        if let Some(leader) = escalate_to {
            push_event(&mut events, config, task, now, kind, RecipientRole::Leader, leader, payload);
        }
    }

    if !events.is_empty() {
        debug!(task = %task.key, events = events.len(), "rules fired");
    }
    Ok(events)
}

fn evaluate_rule(
    kind: RuleKind,
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    config: &RuleConfig,
) -> Result<Option<ReminderPayload>> {
    match kind {
        RuleKind::MissingLogtime => logtime::missing_logtime(task, now, config),
        RuleKind::MissingDescription => Ok(description::missing_description(task)),
        RuleKind::PreVersionReminder => Ok(version::pre_version_reminder(task, now, config)),
        RuleKind::PostVersionAlert => Ok(version::post_version_alert(task, now, config)),
        RuleKind::AssigneeChanged => activity::assignee_changed(task, now, config),
        RuleKind::DueDateOverdue => activity::due_date_overdue(task, now, config),
        RuleKind::RecentlyCreated => activity::recently_created(task, now, config),
    }
}

fn primary_role(kind: RuleKind) -> RecipientRole {
    match kind {
        RuleKind::MissingDescription => RecipientRole::Reporter,
        _ => RecipientRole::Assignee,
    }
}

/// Identity for the primary role, falling back to the other party on the task.
fn resolve_recipient(task: &TaskSnapshot, role: RecipientRole) -> Option<String> {
    match role {
        RecipientRole::Reporter => task.reporter_identity().or_else(|| task.assignee_identity()),
        _ => task.assignee_identity().or_else(|| task.reporter_identity()),
    }
}

#[allow(clippy::too_many_arguments)]
fn push_event(
    events: &mut Vec<ReminderEvent>,
    config: &RuleConfig,
    task: &TaskSnapshot,
    now: DateTime<Utc>,
    rule: RuleKind,
    role: RecipientRole,
    recipient: String,
    payload: ReminderPayload,
) {
    if !config.recipient_allowed(&recipient) {
        debug!(task = %task.key, rule = %rule, recipient = %recipient, "recipient not in test allow-list");
        return;
    }
    events.push(ReminderEvent {
        task_key: task.key.clone(),
        task_summary: task.summary.clone(),
        task_url: task.url.clone(),
        rule,
        role,
        recipient,
        payload,
        evaluated_at: now,
    });
}
