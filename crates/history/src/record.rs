use chrono::{DateTime, Utc};
use nudge_core::{DeliveryStatus, HistoryKey, RuleKind};
use serde::{Deserialize, Serialize};

/// Longest response summary kept in the ledger, in characters.
pub const MAX_SUMMARY_CHARS: usize = 500;

/// One delivery attempt as persisted. The latest record per key is the
/// key's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub task_key: String,
    pub rule: RuleKind,
    pub recipient: String,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub response_summary: String,
}

impl HistoryRecord {
    pub fn new(
        key: &HistoryKey,
        sent_at: DateTime<Utc>,
        status: DeliveryStatus,
        response_summary: &str,
    ) -> Self {
        Self {
            task_key: key.task_key.clone(),
            rule: key.rule,
            recipient: key.recipient.clone(),
            sent_at,
            status,
            response_summary: truncate_summary(response_summary),
        }
    }

    pub fn key(&self) -> HistoryKey {
        HistoryKey::new(&self.task_key, self.rule, &self.recipient)
    }
}

/// Cut `summary` to [`MAX_SUMMARY_CHARS`] characters.
pub fn truncate_summary(summary: &str) -> String {
    match summary.char_indices().nth(MAX_SUMMARY_CHARS) {
        Some((idx, _)) => summary[..idx].to_string(),
        None => summary.to_string(),
    }
}
