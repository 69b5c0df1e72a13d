//! Publish/subscribe registry keyed by event kind

use hookwire_proto::{Envelope, EventKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Callback invoked for each delivered envelope
///
/// Any `Fn(&Envelope) -> anyhow::Result<()>` closure is a handler.
pub trait EventHandler: Send + Sync {
    /// Handle one envelope
    fn handle(&self, envelope: &Envelope) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self(envelope)
    }
}

/// Subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Every published envelope
    All,
    /// Envelopes of one kind
    Kind(EventKind),
}

impl From<EventKind> for EventKey {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::All => Self::All,
            other => Self::Kind(other),
        }
    }
}

/// Handle returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    key: EventKey,
    handler: Arc<dyn EventHandler>,
    once: bool,
}

/// Event bus delivering envelopes to subscribers in registration order
///
/// For each publish, wildcard subscribers run before kind-specific ones.
/// Handlers run outside the registry lock, so a handler may subscribe or
/// unsubscribe without deadlocking.
pub struct EventBus {
    /// Subscriptions in registration order
    subscriptions: RwLock<Vec<Subscription>>,
    /// Next subscription id
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe `handler` to `key`
    pub async fn subscribe<H>(&self, key: impl Into<EventKey>, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.insert(key.into(), Arc::new(handler), false).await
    }

    /// Subscribe `handler` for a single delivery
    pub async fn subscribe_once<H>(&self, key: impl Into<EventKey>, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.insert(key.into(), Arc::new(handler), true).await
    }

    /// Subscribe one handler to several kinds; an empty list means all events
    pub async fn subscribe_many<H>(&self, kinds: &[EventKind], handler: H) -> Vec<SubscriptionId>
    where
        H: EventHandler + 'static,
    {
        self.insert_many(kinds, Arc::new(handler), false).await
    }

    /// Like [`subscribe_many`](Self::subscribe_many), but each kind is delivered at most once
    pub async fn subscribe_many_once<H>(&self, kinds: &[EventKind], handler: H) -> Vec<SubscriptionId>
    where
        H: EventHandler + 'static,
    {
        self.insert_many(kinds, Arc::new(handler), true).await
    }

    async fn insert_many(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>, once: bool) -> Vec<SubscriptionId> {
        if kinds.is_empty() {
            return vec![self.insert(EventKey::All, handler, once).await];
        }

        let mut ids = Vec::with_capacity(kinds.len());
        for kind in kinds {
            ids.push(self.insert(EventKey::from(*kind), handler.clone(), once).await);
        }
        ids
    }

    async fn insert(&self, key: EventKey, handler: Arc<dyn EventHandler>, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.push(Subscription { id, key, handler, once });
        debug!("Subscribed {:?} to {:?} (once: {})", id, key, once);
        id
    }

    /// Remove a subscription; returns whether it existed
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        before != subscriptions.len()
    }

    /// Number of registered subscriptions
    pub async fn subscriber_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Deliver `envelope` to every matching subscriber
    ///
    /// Untyped envelopes only reach wildcard subscribers. Handler errors and
    /// panics are logged and do not stop delivery. Returns the number of
    /// handlers invoked.
    pub async fn publish(&self, envelope: &Envelope) -> usize {
        let key = envelope.kind.map(EventKey::from).unwrap_or(EventKey::All);
        let handlers = self.take_matching(key).await;

        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Event handler failed for {:?} from client {}: {:#}", envelope.kind, envelope.client_id, e);
                }
                Err(_) => {
                    error!("Event handler panicked for {:?} from client {}", envelope.kind, envelope.client_id);
                }
            }
        }

        handlers.len()
    }

    /// Collect handlers for `key` in delivery order, dropping once-subscriptions
    async fn take_matching(&self, key: EventKey) -> Vec<Arc<dyn EventHandler>> {
        let mut subscriptions = self.subscriptions.write().await;

        let wildcard = subscriptions.iter().filter(|s| s.key == EventKey::All);
        let specific = subscriptions
            .iter()
            .filter(|s| key != EventKey::All && s.key == key);
        let handlers: Vec<_> = wildcard.chain(specific).map(|s| s.handler.clone()).collect();

        subscriptions.retain(|s| !(s.once && (s.key == EventKey::All || s.key == key)));
        handlers
    }
}
