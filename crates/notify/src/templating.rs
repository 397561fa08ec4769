//! Minijinja rendering for reminder messages.
//!
//! Every rule kind has a built-in template; the rule configuration may
//! override it per rule. Templates see the event's task fields, the rule and
//! role names, and the payload's fields flattened to the top level.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use std::collections::HashMap;

use nudge_core::{RecipientRole, ReminderEvent, ReminderPayload, RuleKind};
use serde::Serialize;

use crate::traits::DeliveryError;

/// Context exposed to message templates.
#[derive(Debug, Serialize)]
struct MessageContext<'a> {
    task_key: &'a str,
    task_summary: &'a str,
    task_url: &'a str,
    rule: RuleKind,
    role: RecipientRole,
    recipient: &'a str,
    #[serde(flatten)]
    payload: &'a ReminderPayload,
}

impl<'a> From<&'a ReminderEvent> for MessageContext<'a> {
    fn from(event: &'a ReminderEvent) -> Self {
        Self {
            task_key: &event.task_key,
            task_summary: &event.task_summary,
            task_url: &event.task_url,
            rule: event.rule,
            role: event.role,
            recipient: &event.recipient,
            payload: &event.payload,
        }
    }
}

/// Built-in message for a rule kind.
pub fn default_template(kind: RuleKind) -> &'static str {
    match kind {
        RuleKind::MissingLogtime => concat!(
            "[{{ task_key }}] {{ task_summary }}\n",
            "The task is in CI testing{% if waited_minutes is not none %} for {{ waited_minutes }} minutes{% endif %}",
            " but has no logged work. Please log your time.\n{{ task_url }}"
        ),
        RuleKind::MissingDescription => concat!(
            "[{{ task_key }}] {{ task_summary }}\n",
            "The task has no description. Please add one.\n{{ task_url }}"
        ),
        RuleKind::PreVersionReminder => concat!(
            "[{{ task_key }}] {{ task_summary }}\n",
            "Release {{ fix_version }} is due {{ release_date }} ({{ days_until | days }} left)",
            " and the task has not reached UAT yet.\n{{ task_url }}"
        ),
        RuleKind::PostVersionAlert => concat!(
            "{% if role == 'leader' %}[Escalation] {% endif %}[{{ task_key }}] {{ task_summary }}\n",
            "Release {{ fix_version }} was due {{ release_date }} ({{ days_overdue | days }} ago)",
            " and the task is not in production yet.\n{{ task_url }}"
        ),
        RuleKind::AssigneeChanged => concat!(
            "[{{ task_key }}] {{ task_summary }}\n",
            "This task was assigned to you at {{ changed_at }}.\n{{ task_url }}"
        ),
        RuleKind::DueDateOverdue => concat!(
            "[{{ task_key }}] {{ task_summary }}\n",
            "The due date {{ due_date }} has passed ({{ days_overdue | days }} overdue).\n{{ task_url }}"
        ),
        RuleKind::RecentlyCreated => concat!(
            "[{{ task_key }}] {{ task_summary }}\n",
            "New task created at {{ created_at }}.\n{{ task_url }}"
        ),
    }
}

/// Renders reminder events to message text.
#[derive(Debug, Default)]
pub struct ReminderRenderer {
    overrides: HashMap<RuleKind, String>,
}

impl ReminderRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer with per-rule template overrides.
    ///
    /// Every override is parsed up front; a syntax error is returned as
    /// [`DeliveryError::Config`].
    pub fn with_overrides(overrides: HashMap<RuleKind, String>) -> Result<Self, DeliveryError> {
        let renderer = Self { overrides };
        for (kind, template) in &renderer.overrides {
            renderer
                .validate(template)
                .map_err(|e| DeliveryError::Config(format!("invalid template for {kind}: {e}")))?;
        }
        Ok(renderer)
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("days", days_filter);
        env
    }

    pub fn template_for(&self, kind: RuleKind) -> &str {
        self.overrides
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_template(kind))
    }

    /// Render the message for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Template`] if rendering fails.
    pub fn render(&self, event: &ReminderEvent) -> Result<String, DeliveryError> {
        let env = Self::build_env();
        let rendered = env
            .render_str(self.template_for(event.rule), MessageContext::from(event))
            .map_err(|e| DeliveryError::Template(e.to_string()))?;
        Ok(rendered.trim().to_string())
    }

    /// Validate that a template string parses without errors.
    pub fn validate(&self, template_str: &str) -> Result<(), DeliveryError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| DeliveryError::Template(e.to_string()))?;
        Ok(())
    }
}

/// Custom filter: `1 day`, `3 days`.
fn days_filter(value: i64) -> String {
    if value.abs() == 1 {
        format!("{value} day")
    } else {
        format!("{value} days")
    }
}
