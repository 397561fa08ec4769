//! Persistence seam for the history ledger.

use std::collections::HashMap;
use std::sync::RwLock;

use nudge_core::HistoryKey;

use crate::error::Result;
use crate::record::HistoryRecord;

/// Where history records live.
///
/// Implementations keep the latest record per key readable and make
/// `append` durable before returning `Ok`.
pub trait HistoryBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Most recent record for `key`.
    fn latest(&self, key: &HistoryKey) -> Result<Option<HistoryRecord>>;

    /// Persist one attempt.
    fn append(&self, record: &HistoryRecord) -> Result<()>;

    /// Most recent record for every key.
    fn latest_all(&self) -> Result<Vec<HistoryRecord>>;
}

/// Keep whichever record is newer; on equal timestamps the incoming one wins.
pub(crate) fn upsert_latest(index: &mut HashMap<HistoryKey, HistoryRecord>, record: HistoryRecord) {
    let key = record.key();
    match index.get(&key) {
        Some(existing) if existing.sent_at > record.sent_at => {}
        _ => {
            index.insert(key, record);
        }
    }
}

pub(crate) fn sorted(index: &HashMap<HistoryKey, HistoryRecord>) -> Vec<HistoryRecord> {
    let mut records: Vec<HistoryRecord> = index.values().cloned().collect();
    records.sort_by(|a, b| a.key().cmp(&b.key()));
    records
}

/// Non-durable ledger for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<HashMap<HistoryKey, HistoryRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryBackend for MemoryLedger {
    fn name(&self) -> &str {
        "memory"
    }

    fn latest(&self, key: &HistoryKey) -> Result<Option<HistoryRecord>> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(key).cloned())
    }

    fn append(&self, record: &HistoryRecord) -> Result<()> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        upsert_latest(&mut guard, record.clone());
        Ok(())
    }

    fn latest_all(&self) -> Result<Vec<HistoryRecord>> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(sorted(&guard))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use nudge_core::{DeliveryStatus, RuleKind};

    use super::*;

    #[test]
    fn older_record_does_not_replace_newer() {
        let ledger = MemoryLedger::new();
        let key = HistoryKey::new("FC-1", RuleKind::MissingDescription, "pm@example.com");
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
        ledger
            .append(&HistoryRecord::new(&key, t, DeliveryStatus::Success, "ok"))
            .unwrap();
        ledger
            .append(&HistoryRecord::new(&key, t - Duration::hours(1), DeliveryStatus::Failure, "late"))
            .unwrap();
        let latest = ledger.latest(&key).unwrap().unwrap();
        assert_eq!(latest.sent_at, t);
        assert_eq!(latest.status, DeliveryStatus::Success);
        assert_eq!(ledger.latest_all().unwrap().len(), 1);
    }
}
