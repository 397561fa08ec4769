use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The reminder rules the engine knows about.
///
/// The first four are the core rules and are enabled by default; the rest are
/// opt-in through the rule configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    MissingLogtime,
    MissingDescription,
    PreVersionReminder,
    PostVersionAlert,
    AssigneeChanged,
    DueDateOverdue,
    RecentlyCreated,
}

impl RuleKind {
    pub const ALL: [RuleKind; 7] = [
        RuleKind::MissingLogtime,
        RuleKind::MissingDescription,
        RuleKind::PreVersionReminder,
        RuleKind::PostVersionAlert,
        RuleKind::AssigneeChanged,
        RuleKind::DueDateOverdue,
        RuleKind::RecentlyCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::MissingLogtime => "missing_logtime",
            RuleKind::MissingDescription => "missing_description",
            RuleKind::PreVersionReminder => "pre_version_reminder",
            RuleKind::PostVersionAlert => "post_version_alert",
            RuleKind::AssigneeChanged => "assignee_changed",
            RuleKind::DueDateOverdue => "due_date_overdue",
            RuleKind::RecentlyCreated => "recently_created",
        }
    }

    /// Whether the rule runs when the configuration does not mention it.
    pub fn enabled_by_default(&self) -> bool {
        matches!(
            self,
            RuleKind::MissingLogtime
                | RuleKind::MissingDescription
                | RuleKind::PreVersionReminder
                | RuleKind::PostVersionAlert
        )
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| format!("unknown rule kind: {s}"))
    }
}

/// Who a reminder is addressed to, relative to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Assignee,
    Reporter,
    Leader,
}

impl fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientRole::Assignee => write!(f, "assignee"),
            RecipientRole::Reporter => write!(f, "reporter"),
            RecipientRole::Leader => write!(f, "leader"),
        }
    }
}

/// Rule-specific facts the message template can refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderPayload {
    MissingLogtime {
        /// Minutes spent in the testing status; `None` when the transition time is unknown.
        waited_minutes: Option<i64>,
    },
    MissingDescription,
    PreVersion {
        fix_version: String,
        release_date: NaiveDate,
        days_until: i64,
    },
    PostVersion {
        fix_version: String,
        release_date: NaiveDate,
        days_overdue: i64,
    },
    AssigneeChanged {
        changed_at: DateTime<Utc>,
    },
    DueDateOverdue {
        due_date: NaiveDate,
        days_overdue: i64,
    },
    RecentlyCreated {
        created_at: DateTime<Utc>,
    },
}

/// A reminder the rule engine decided is logically due.
///
/// Lives only for the duration of one cycle; what survives is the
/// [`HistoryKey`] charged when delivery is attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderEvent {
    pub task_key: String,
    pub task_summary: String,
    pub task_url: String,
    pub rule: RuleKind,
    pub role: RecipientRole,
    /// Normalized identity of the logical recipient.
    pub recipient: String,
    pub payload: ReminderPayload,
    pub evaluated_at: DateTime<Utc>,
}

impl ReminderEvent {
    pub fn history_key(&self) -> HistoryKey {
        HistoryKey::new(&self.task_key, self.rule, &self.recipient)
    }
}

/// Composite ledger key: one logical record per (task, rule, recipient).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryKey {
    pub task_key: String,
    pub rule: RuleKind,
    pub recipient: String,
}

impl HistoryKey {
    pub fn new(task_key: &str, rule: RuleKind, recipient: &str) -> Self {
        Self {
            task_key: task_key.trim().to_string(),
            rule,
            recipient: crate::task::normalize_identity(recipient),
        }
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.task_key, self.rule, self.recipient)
    }
}

/// Outcome of one delivery attempt as persisted in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failure,
    NoRoute,
}

impl DeliveryStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryStatus::Success)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Success => write!(f, "success"),
            DeliveryStatus::Failure => write!(f, "failure"),
            DeliveryStatus::NoRoute => write!(f, "no_route"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_kind_round_trips_through_str() {
        for kind in RuleKind::ALL {
            assert_eq!(kind.as_str().parse::<RuleKind>(), Ok(kind));
        }
        assert!("nope".parse::<RuleKind>().is_err());
    }

    #[test]
    fn only_core_rules_enabled_by_default() {
        let enabled: Vec<_> = RuleKind::ALL
            .into_iter()
            .filter(RuleKind::enabled_by_default)
            .collect();
        assert_eq!(
            enabled,
            vec![
                RuleKind::MissingLogtime,
                RuleKind::MissingDescription,
                RuleKind::PreVersionReminder,
                RuleKind::PostVersionAlert,
            ]
        );
    }

    #[test]
    fn history_key_normalizes_recipient() {
        let a = HistoryKey::new("FC-1", RuleKind::MissingLogtime, " Dev@Example.com");
        let b = HistoryKey::new("FC-1", RuleKind::MissingLogtime, "dev@example.com");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "FC-1/missing_logtime/dev@example.com");
    }

    #[test]
    fn delivery_status_serializes_snake_case() {
        let json = serde_json::to_string(&DeliveryStatus::NoRoute).unwrap();
        assert_eq!(json, "\"no_route\"");
    }
}
