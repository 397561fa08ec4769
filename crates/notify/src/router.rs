//! Routes a reminder to a delivery address.
//!
//! Resolution order for one event: the recipient's direct address, then the
//! recipient's group from the identity directory. The group is tried only
//! when the direct address cannot be resolved or the adapter rejects it as
//! invalid; a transient failure on the direct route ends the event as a
//! failure. With neither route the outcome is `no_route`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nudge_core::{DeliveryStatus, Directory, ReminderEvent};

use crate::traits::{Address, DeliveryAdapter, DeliveryError};

/// Which route an attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Direct,
    Group,
}

/// One planned delivery, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub route: RouteKind,
    pub address: Address,
}

/// Result of routing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    pub status: DeliveryStatus,
    /// The attempt that decided the outcome, if any was made.
    pub delivered_via: Option<DeliveryAttempt>,
    /// Number of adapter calls made.
    pub attempts: usize,
    /// Provider response or error text for the ledger.
    pub summary: String,
}

/// Applies direct-first, group-fallback routing over a [`DeliveryAdapter`].
pub struct Router {
    adapter: Arc<dyn DeliveryAdapter>,
    directory: Arc<Directory>,
    /// Lower-cased e-mail domain prefixes allowed for direct delivery.
    domains_allowed: Vec<String>,
    /// Upper bound on a single adapter call.
    timeout: Duration,
}

impl Router {
    pub fn new(adapter: Arc<dyn DeliveryAdapter>, directory: Arc<Directory>, timeout: Duration) -> Self {
        Self {
            adapter,
            directory,
            domains_allowed: Vec::new(),
            timeout,
        }
    }

    /// Restrict direct delivery to identities whose domain starts with one of `domains`.
    pub fn with_domains_allowed(mut self, domains: &[String]) -> Self {
        self.domains_allowed = domains
            .iter()
            .map(|d| d.trim().trim_start_matches('@').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    pub fn channel_name(&self) -> &str {
        self.adapter.channel_name()
    }

    fn domain_allowed(&self, identity: &str) -> bool {
        let Some((_, domain)) = identity.rsplit_once('@') else {
            return false;
        };
        let domain = domain.trim().to_lowercase();
        !domain.is_empty()
            && (self.domains_allowed.is_empty()
                || self.domains_allowed.iter().any(|d| domain.starts_with(d.as_str())))
    }

    /// Direct address: the directory override, else the identity itself when
    /// it is an e-mail in an allowed domain.
    pub fn direct_address(&self, identity: &str) -> Option<Address> {
        if let Some(address) = self.directory.address_override(identity) {
            return Some(Address::User(address.to_string()));
        }
        self.domain_allowed(identity)
            .then(|| Address::User(identity.trim().to_string()))
    }

    /// Ordered delivery plan for `event`. Empty means no route.
    pub fn resolve(&self, event: &ReminderEvent) -> Vec<DeliveryAttempt> {
        let mut plan = Vec::with_capacity(2);
        if let Some(address) = self.direct_address(&event.recipient) {
            plan.push(DeliveryAttempt {
                route: RouteKind::Direct,
                address,
            });
        }
        if let Some(group) = self.directory.group_of(&event.recipient) {
            plan.push(DeliveryAttempt {
                route: RouteKind::Group,
                address: Address::Group(group.to_string()),
            });
        }
        plan
    }

    async fn send_with_timeout(&self, address: &Address, text: &str) -> Result<String, DeliveryError> {
        match tokio::time::timeout(self.timeout, self.adapter.send(address, text)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }

    /// Deliver `text` for `event`, stopping at the first success.
    pub async fn deliver(&self, event: &ReminderEvent, text: &str) -> RouteOutcome {
        let plan = self.resolve(event);
        if plan.is_empty() {
            tracing::info!(
                task = %event.task_key,
                rule = %event.rule,
                recipient = %event.recipient,
                "no direct address or group, dropping"
            );
            return RouteOutcome {
                status: DeliveryStatus::NoRoute,
                delivered_via: None,
                attempts: 0,
                summary: format!("no route for {}", event.recipient),
            };
        }

        let mut notes: Vec<String> = Vec::new();
        let total = plan.len();
        for (idx, attempt) in plan.into_iter().enumerate() {
            let start = Instant::now();
            let result = self.send_with_timeout(&attempt.address, text).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(response) => {
                    tracing::info!(
                        task = %event.task_key,
                        rule = %event.rule,
                        address = %attempt.address,
                        channel = self.adapter.channel_name(),
                        duration_ms,
                        "reminder delivered"
                    );
                    notes.push(response);
                    return RouteOutcome {
                        status: DeliveryStatus::Success,
                        delivered_via: Some(attempt),
                        attempts: idx + 1,
                        summary: notes.join("; "),
                    };
                }
                Err(e) => {
                    let has_next = idx + 1 < total;
                    tracing::warn!(
                        task = %event.task_key,
                        rule = %event.rule,
                        address = %attempt.address,
                        error = %e,
                        duration_ms,
                        fallback = has_next && e.allows_fallback(),
                        "reminder delivery failed"
                    );
                    notes.push(format!("{}: {e}", attempt.address));
                    if has_next && e.allows_fallback() {
                        continue;
                    }
                    return RouteOutcome {
                        status: DeliveryStatus::Failure,
                        delivered_via: Some(attempt),
                        attempts: idx + 1,
                        summary: notes.join("; "),
                    };
                }
            }
        }

        // every planned attempt either returns or continues to a later one
        RouteOutcome {
            status: DeliveryStatus::Failure,
            delivered_via: None,
            attempts: total,
            summary: notes.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use nudge_core::{RecipientRole, ReminderPayload, RuleKind};

    use super::*;

    #[derive(Clone, Copy)]
    enum Behavior {
        Ok,
        Invalid,
        Transient,
        Hang,
    }

    struct MockAdapter {
        behaviors: HashMap<Address, Behavior>,
        send_count: AtomicUsize,
        sent_to: Mutex<Vec<Address>>,
    }

    impl MockAdapter {
        fn new(behaviors: Vec<(Address, Behavior)>) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors.into_iter().collect(),
                send_count: AtomicUsize::new(0),
                sent_to: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl DeliveryAdapter for MockAdapter {
        async fn send(&self, address: &Address, _text: &str) -> Result<String, DeliveryError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            self.sent_to.lock().unwrap().push(address.clone());
            match self.behaviors.get(address).copied().unwrap_or(Behavior::Ok) {
                Behavior::Ok => Ok("200 OK".to_string()),
                Behavior::Invalid => Err(DeliveryError::InvalidAddress {
                    address: address.to_string(),
                    reason: "404".to_string(),
                }),
                Behavior::Transient => Err(DeliveryError::Transient("503".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("late".to_string())
                }
            }
        }

        fn channel_name(&self) -> &str {
            "mock"
        }
    }

    fn directory() -> Arc<Directory> {
        Arc::new(
            Directory::from_yaml_str(
                r#"
people:
  - identity: dev@example.com
    group: g-dev
  - identity: ext@partner.org
    group: g-ext
  - identity: bot-user
    address: bot.user@example.com
"#,
            )
            .unwrap(),
        )
    }

    fn event(recipient: &str) -> ReminderEvent {
        ReminderEvent {
            task_key: "FC-100".into(),
            task_summary: "s".into(),
            task_url: String::new(),
            rule: RuleKind::MissingLogtime,
            role: RecipientRole::Assignee,
            recipient: recipient.into(),
            payload: ReminderPayload::MissingLogtime { waited_minutes: Some(10) },
            evaluated_at: Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap(),
        }
    }

    fn user(s: &str) -> Address {
        Address::User(s.into())
    }

    fn group(s: &str) -> Address {
        Address::Group(s.into())
    }

    fn router(adapter: Arc<MockAdapter>) -> Router {
        Router::new(adapter, directory(), Duration::from_secs(5))
            .with_domains_allowed(&["example.com".to_string()])
    }

    #[test]
    fn resolve_orders_direct_before_group() {
        let r = router(MockAdapter::new(vec![]));
        let plan = r.resolve(&event("dev@example.com"));
        assert_eq!(
            plan,
            vec![
                DeliveryAttempt { route: RouteKind::Direct, address: user("dev@example.com") },
                DeliveryAttempt { route: RouteKind::Group, address: group("g-dev") },
            ]
        );
    }

    #[test]
    fn disallowed_domain_resolves_to_group_only() {
        let r = router(MockAdapter::new(vec![]));
        let plan = r.resolve(&event("ext@partner.org"));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].route, RouteKind::Group);
    }

    #[test]
    fn directory_override_is_the_direct_address() {
        let r = router(MockAdapter::new(vec![]));
        let plan = r.resolve(&event("bot-user"));
        assert_eq!(plan, vec![DeliveryAttempt { route: RouteKind::Direct, address: user("bot.user@example.com") }]);
    }

    #[tokio::test]
    async fn direct_success_skips_group() {
        let adapter = MockAdapter::new(vec![]);
        let outcome = router(adapter.clone()).deliver(&event("dev@example.com"), "hi").await;
        assert_eq!(outcome.status, DeliveryStatus::Success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(*adapter.sent_to.lock().unwrap(), vec![user("dev@example.com")]);
    }

    #[tokio::test]
    async fn invalid_direct_falls_back_to_group() {
        let adapter = MockAdapter::new(vec![(user("dev@example.com"), Behavior::Invalid)]);
        let outcome = router(adapter.clone()).deliver(&event("dev@example.com"), "hi").await;
        assert_eq!(outcome.status, DeliveryStatus::Success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.delivered_via.unwrap().route, RouteKind::Group);
        assert_eq!(
            *adapter.sent_to.lock().unwrap(),
            vec![user("dev@example.com"), group("g-dev")]
        );
        assert!(outcome.summary.contains("404"));
    }

    #[tokio::test]
    async fn transient_direct_failure_does_not_fall_back() {
        let adapter = MockAdapter::new(vec![(user("dev@example.com"), Behavior::Transient)]);
        let outcome = router(adapter.clone()).deliver(&event("dev@example.com"), "hi").await;
        assert_eq!(outcome.status, DeliveryStatus::Failure);
        assert_eq!(adapter.send_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_direct_without_group_is_failure() {
        let adapter = MockAdapter::new(vec![(user("solo@example.com"), Behavior::Invalid)]);
        let outcome = router(adapter.clone()).deliver(&event("solo@example.com"), "hi").await;
        assert_eq!(outcome.status, DeliveryStatus::Failure);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn no_address_and_no_group_is_no_route() {
        let adapter = MockAdapter::new(vec![]);
        let outcome = router(adapter.clone()).deliver(&event("nobody@elsewhere.net"), "hi").await;
        assert_eq!(outcome.status, DeliveryStatus::NoRoute);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(adapter.send_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hung_adapter_times_out_as_failure() {
        let adapter = MockAdapter::new(vec![(user("dev@example.com"), Behavior::Hang)]);
        let r = Router::new(adapter.clone(), directory(), Duration::from_millis(50));
        let outcome = r.deliver(&event("dev@example.com"), "hi").await;
        assert_eq!(outcome.status, DeliveryStatus::Failure);
        assert!(outcome.summary.contains("timed out"));
        assert_eq!(adapter.send_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_domain_list_allows_any_email() {
        let r = Router::new(MockAdapter::new(vec![]), Arc::new(Directory::empty()), Duration::from_secs(1));
        assert!(r.direct_address("a@anything.io").is_some());
        assert!(r.direct_address("not-an-email").is_none());
    }
}
