//! Cooldown checks and per-key claims over a [`HistoryBackend`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use nudge_core::{DeliveryStatus, HistoryKey};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::backend::HistoryBackend;
use crate::error::Result;
use crate::record::HistoryRecord;

/// Suppression and recording on top of a backend.
///
/// Callers that want check-then-record to be atomic for a key go through
/// [`HistoryStore::claim`]: the returned [`Claim`] holds that key's lock until
/// the attempt is recorded or the claim is dropped.
pub struct HistoryStore {
    backend: Arc<dyn HistoryBackend>,
    locks: Mutex<HashMap<HistoryKey, Arc<AsyncMutex<()>>>>,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn HistoryBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// True iff the latest record for `key` is younger than `cooldown`.
    ///
    /// A record stamped after `now` (clock moved backwards) counts as recent.
    pub fn is_suppressed(&self, key: &HistoryKey, now: DateTime<Utc>, cooldown: Duration) -> Result<bool> {
        Ok(self
            .backend
            .latest(key)?
            .is_some_and(|last| now.signed_duration_since(last.sent_at) < cooldown))
    }

    /// Upsert the attempt for `key`.
    ///
    /// The stored timestamp never moves backwards: if `now` is older than the
    /// existing record the existing timestamp is kept.
    pub fn record(
        &self,
        key: &HistoryKey,
        now: DateTime<Utc>,
        status: DeliveryStatus,
        response_summary: &str,
    ) -> Result<HistoryRecord> {
        let sent_at = match self.backend.latest(key)? {
            Some(previous) if previous.sent_at > now => {
                warn!(key = %key, previous = %previous.sent_at, now = %now, "clock behind last record, keeping previous timestamp");
                previous.sent_at
            }
            _ => now,
        };
        let record = HistoryRecord::new(key, sent_at, status, response_summary);
        self.backend.append(&record)?;
        debug!(key = %key, status = %status, "recorded attempt");
        Ok(record)
    }

    pub fn latest(&self, key: &HistoryKey) -> Result<Option<HistoryRecord>> {
        self.backend.latest(key)
    }

    /// Latest record of every key, ordered by key.
    pub fn latest_all(&self) -> Result<Vec<HistoryRecord>> {
        self.backend.latest_all()
    }

    fn key_lock(&self, key: &HistoryKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Forget `key`'s lock once nobody holds or waits on it.
    fn release(&self, key: &HistoryKey) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Take exclusive ownership of `key` for one attempt.
    ///
    /// Waits for any in-flight attempt on the same key, then returns `None`
    /// when the key is still inside its cooldown.
    pub async fn claim(
        &self,
        key: &HistoryKey,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Option<Claim<'_>>> {
        let guard = self.key_lock(key).lock_owned().await;
        let suppressed = self.is_suppressed(key, now, cooldown);
        if !matches!(suppressed, Ok(false)) {
            drop(guard);
            self.release(key);
            return suppressed.map(|_| None);
        }
        Ok(Some(Claim {
            store: self,
            key: key.clone(),
            now,
            guard: Some(guard),
        }))
    }
}

/// Exclusive right to attempt one delivery for a key.
pub struct Claim<'a> {
    store: &'a HistoryStore,
    key: HistoryKey,
    now: DateTime<Utc>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.store.release(&self.key);
    }
}

impl Claim<'_> {
    pub fn key(&self) -> &HistoryKey {
        &self.key
    }

    /// Record the outcome at the claim time and release the key.
    pub fn record(self, status: DeliveryStatus, response_summary: &str) -> Result<HistoryRecord> {
        self.store.record(&self.key, self.now, status, response_summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use nudge_core::RuleKind;

    use super::*;
    use crate::backend::MemoryLedger;

    fn store() -> HistoryStore {
        HistoryStore::new(Arc::new(MemoryLedger::new()))
    }

    fn key() -> HistoryKey {
        HistoryKey::new("FC-100", RuleKind::MissingLogtime, "dev@example.com")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap()
    }

    #[test]
    fn suppression_window_is_half_open() {
        let store = store();
        let cooldown = Duration::hours(3);
        assert!(!store.is_suppressed(&key(), t0(), cooldown).unwrap());
        store.record(&key(), t0(), DeliveryStatus::Success, "ok").unwrap();
        assert!(store.is_suppressed(&key(), t0(), cooldown).unwrap());
        assert!(store.is_suppressed(&key(), t0() + Duration::minutes(179), cooldown).unwrap());
        assert!(!store.is_suppressed(&key(), t0() + cooldown, cooldown).unwrap());
    }

    #[test]
    fn failed_attempt_starts_cooldown() {
        let store = store();
        store.record(&key(), t0(), DeliveryStatus::Failure, "503").unwrap();
        assert!(store.is_suppressed(&key(), t0() + Duration::hours(1), Duration::hours(3)).unwrap());
    }

    #[test]
    fn timestamps_never_regress() {
        let store = store();
        store.record(&key(), t0(), DeliveryStatus::Success, "").unwrap();
        let rec = store
            .record(&key(), t0() - Duration::minutes(10), DeliveryStatus::Failure, "")
            .unwrap();
        assert_eq!(rec.sent_at, t0());
        assert_eq!(store.latest(&key()).unwrap().unwrap().status, DeliveryStatus::Failure);
        // and a clock behind the record still counts as within cooldown
        assert!(store.is_suppressed(&key(), t0() - Duration::hours(5), Duration::hours(3)).unwrap());
    }

    #[tokio::test]
    async fn claim_is_refused_inside_cooldown() {
        let store = store();
        let cooldown = Duration::hours(3);
        let claim = store.claim(&key(), t0(), cooldown).await.unwrap().unwrap();
        claim.record(DeliveryStatus::Success, "ok").unwrap();
        assert!(store
            .claim(&key(), t0() + Duration::minutes(30), cooldown)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .claim(&key(), t0() + Duration::hours(3), cooldown)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn concurrent_claims_on_one_key_yield_one_attempt() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                match store.claim(&key(), t0(), Duration::hours(3)).await.unwrap() {
                    Some(claim) => {
                        tokio::task::yield_now().await;
                        claim.record(DeliveryStatus::Success, "ok").unwrap();
                        1
                    }
                    None => 0,
                }
            }));
        }
        let mut attempts = 0;
        for h in handles {
            attempts += h.await.unwrap();
        }
        assert_eq!(attempts, 1);
        assert_eq!(store.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn dropped_claim_records_nothing() {
        let store = store();
        let claim = store.claim(&key(), t0(), Duration::hours(3)).await.unwrap();
        drop(claim);
        assert!(store.latest(&key()).unwrap().is_none());
        assert!(store.claim(&key(), t0(), Duration::hours(3)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn idle_key_locks_are_forgotten() {
        let store = store();
        let cooldown = Duration::hours(3);
        let other = HistoryKey::new("FC-200", RuleKind::MissingLogtime, "dev@example.com");

        let claim = store.claim(&key(), t0(), cooldown).await.unwrap().unwrap();
        let dropped = store.claim(&other, t0(), cooldown).await.unwrap().unwrap();
        assert_eq!(store.tracked_keys(), 2);

        claim.record(DeliveryStatus::Success, "ok").unwrap();
        drop(dropped);
        assert_eq!(store.tracked_keys(), 0);

        // a refused claim leaves nothing behind either
        assert!(store.claim(&key(), t0(), cooldown).await.unwrap().is_none());
        assert_eq!(store.tracked_keys(), 0);

        for n in 0..50 {
            let key = HistoryKey::new(&format!("FC-{n}"), RuleKind::MissingLogtime, "dev@example.com");
            let claim = store.claim(&key, t0(), cooldown).await.unwrap().unwrap();
            claim.record(DeliveryStatus::Success, "ok").unwrap();
        }
        assert_eq!(store.tracked_keys(), 0);
    }
}
