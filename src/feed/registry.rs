use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::sync::oneshot;
use tracing::trace;

use super::ConfirmationEvent;

// -----------------------------------------------------------------------------
// ----- SubscriptionId --------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// -----------------------------------------------------------------------------
// ----- DispatchStats ---------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub matched: usize,
    pub delivered: usize,
    pub dropped: usize,
}

// -----------------------------------------------------------------------------
// ----- Handoff ---------------------------------------------------------------

/// Rendezvous between the feed and one subscriber. It holds a slot only while
/// the subscriber is parked in [`Subscriber::recv`], so there is nothing to
/// buffer into.
#[derive(Debug, Default)]
struct Handoff {
    waiting: Mutex<Option<oneshot::Sender<Arc<ConfirmationEvent>>>>,
}

impl Handoff {
    fn offer(&self, event: &Arc<ConfirmationEvent>) -> bool {
        let Some(waiter) = self.waiting.lock().take() else {
            return false;
        };

        // Fails when the parked `recv` was dropped before the event arrived.
        waiter.send(event.clone()).is_ok()
    }
}

// -----------------------------------------------------------------------------
// ----- SubscriptionRegistry --------------------------------------------------

/// Live subscriptions, sharded so fan-out and subscribe/unsubscribe do not
/// contend on one lock. Handoffs are held weakly: the registry never keeps a
/// subscriber alive on its own.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<SubscriptionId, Subscription>,
    next_id: AtomicU64,
}

struct Subscription {
    handoff: Weak<Handoff>,
    accounts: SmallVec<[String; 4]>,
}

impl Subscription {
    fn matches(&self, account: &str) -> bool {
        self.accounts.is_empty() || self.accounts.iter().any(|a| a == account)
    }
}

// -----------------------------------------------------------------------------
// ----- SubscriptionRegistry: Public ------------------------------------------

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with an account allow-list. An empty list
    /// matches every event. The returned [`Subscriber`] unregisters itself
    /// when dropped.
    pub fn register(
        self: &Arc<Self>,
        accounts: impl IntoIterator<Item = String>,
    ) -> Subscriber {
        let handoff = Arc::new(Handoff::default());
        let id = self.insert(&handoff, accounts);

        Subscriber {
            id,
            registry: self.clone(),
            handoff,
        }
    }

    /// Removing an unknown id is a no-op. Returns whether anything was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.remove(&id).is_some();
        if removed {
            trace!("removed subscription {id}");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Offer `event` to every matching subscription without waiting. A
    /// subscriber that is not parked in `recv` right now misses the event.
    pub fn dispatch(&self, event: &Arc<ConfirmationEvent>) -> DispatchStats {
        let account = event.counterparty_account();
        let mut stats = DispatchStats::default();

        for entry in self.subscriptions.iter() {
            let subscription = entry.value();
            if !subscription.matches(account) {
                continue;
            }

            stats.matched += 1;

            let delivered = subscription
                .handoff
                .upgrade()
                .is_some_and(|handoff| handoff.offer(event));

            if delivered {
                stats.delivered += 1;
            } else {
                trace!("dropped event for subscription {}", entry.key());
                stats.dropped += 1;
            }
        }

        stats
    }
}

// -----------------------------------------------------------------------------
// ----- SubscriptionRegistry: Private -----------------------------------------

impl SubscriptionRegistry {
    fn insert(
        &self,
        handoff: &Arc<Handoff>,
        accounts: impl IntoIterator<Item = String>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.subscriptions.insert(
            id,
            Subscription {
                handoff: Arc::downgrade(handoff),
                accounts: accounts.into_iter().collect(),
            },
        );

        trace!("registered subscription {id}");
        id
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Subscriber ------------------------------------------------------------

/// Receiving end of one subscription. Dropping it, on any path, removes the
/// registry entry.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriptionId,
    registry: Arc<SubscriptionRegistry>,
    handoff: Arc<Handoff>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Park until the next matching event. Only events dispatched while this
    /// future is pending are seen; earlier ones are gone.
    pub async fn recv(&mut self) -> Option<Arc<ConfirmationEvent>> {
        let (waiter, event) = oneshot::channel();
        *self.handoff.waiting.lock() = Some(waiter);
        event.await.ok()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::pin::pin;
    use std::task::Poll;

    use futures::poll;

    use super::*;
    use crate::feed::event::tests::{CONFIRMATION, COUNTERPARTY};

    fn event() -> Arc<ConfirmationEvent> {
        Arc::new(ConfirmationEvent::decode(CONFIRMATION.as_bytes()).unwrap())
    }

    #[tokio::test]
    async fn filter_matches_counterparty_only() {
        let registry = Arc::new(SubscriptionRegistry::new());

        let mut matching = registry.register([COUNTERPARTY.to_string()]);
        let mut other = registry.register(["nano_someoneelse".to_string()]);
        let mut everything = registry.register(Vec::new());

        let mut matching = pin!(matching.recv());
        let mut other = pin!(other.recv());
        let mut everything = pin!(everything.recv());
        assert!(poll!(matching.as_mut()).is_pending());
        assert!(poll!(other.as_mut()).is_pending());
        assert!(poll!(everything.as_mut()).is_pending());

        let stats = registry.dispatch(&event());
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.delivered, 2);

        match poll!(matching.as_mut()) {
            Poll::Ready(Some(event)) => assert_eq!(event.message.block.work, "c950fc037d61e372"),
            unexpected => panic!("expected an event, got {unexpected:?}"),
        }
        assert!(poll!(other.as_mut()).is_pending());
        assert!(matches!(poll!(everything.as_mut()), Poll::Ready(Some(_))));
    }

    #[tokio::test]
    async fn event_offered_while_not_receiving_is_never_seen() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let mut subscriber = registry.register(Vec::new());

        let stats = registry.dispatch(&event());
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 1);

        // Nothing was kept for later.
        let mut next = pin!(subscriber.recv());
        assert!(poll!(next.as_mut()).is_pending());
        assert!(poll!(next.as_mut()).is_pending());

        assert_eq!(registry.dispatch(&event()).delivered, 1);
        assert!(next.await.is_some());

        // One parked `recv` takes one event; the next one is dropped again.
        assert_eq!(registry.dispatch(&event()).dropped, 1);
    }

    #[tokio::test]
    async fn abandoned_recv_does_not_take_events() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let mut subscriber = registry.register(Vec::new());

        {
            let mut next = pin!(subscriber.recv());
            assert!(poll!(next.as_mut()).is_pending());
        }

        let stats = registry.dispatch(&event());
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_idempotent() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let subscriber = registry.register(Vec::new());

        assert!(registry.unsubscribe(subscriber.id()));
        assert!(!registry.unsubscribe(subscriber.id()));

        assert_eq!(registry.dispatch(&event()), DispatchStats::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_subscriber_unregisters() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let subscriber = registry.register(Vec::new());
        assert_eq!(registry.len(), 1);

        drop(subscriber);
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_does_not_keep_handoffs_alive() {
        let registry = SubscriptionRegistry::new();
        let handoff = Arc::new(Handoff::default());

        registry.insert(&handoff, Vec::new());
        drop(handoff);

        assert_eq!(registry.dispatch(&event()).dropped, 1);
    }

    #[tokio::test]
    async fn concurrent_subscribe_and_dispatch() {
        let registry = Arc::new(SubscriptionRegistry::new());

        let dispatcher = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    registry.dispatch(&event());
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let subscriber = registry.register(Vec::new());
                    tokio::task::yield_now().await;
                    drop(subscriber);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        dispatcher.await.unwrap();

        assert!(registry.is_empty());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
