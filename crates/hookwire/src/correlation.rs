//! Trace id to waiting request correlation

use crate::{HookwireError, Result};
use hookwire_proto::Envelope;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};

type PendingMap = HashMap<String, PendingEntry>;

/// Registry-side record of an outstanding request
struct PendingEntry {
    /// Registration id, distinguishes reuse of the same trace
    id: u64,
    /// Command code of the request
    code: i64,
    /// Request as sent
    request: Value,
    /// Single-assignment response slot
    responder: oneshot::Sender<Envelope>,
}

/// Caller-side handle for an outstanding request
///
/// Dropping the handle before its wait completes removes the registry
/// entry, so abandoned or cancelled waits never leak.
pub struct PendingRequest {
    trace: String,
    id: u64,
    response_rx: oneshot::Receiver<Envelope>,
    registry: Weak<RwLock<PendingMap>>,
    settled: bool,
}

impl PendingRequest {
    /// Trace id the request was registered under
    pub fn trace(&self) -> &str {
        &self.trace
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("trace", &self.trace)
            .field("id", &self.id)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Some(pending) = self.registry.upgrade() else {
            return;
        };

        let trace = std::mem::take(&mut self.trace);
        let id = self.id;
        if let Ok(mut map) = pending.try_write() {
            remove_owned(&mut map, &trace, id);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    remove_owned(&mut *pending.write().await, &trace, id);
                });
            }
            Err(_) => {
                remove_owned(&mut pending.blocking_write(), &trace, id);
            }
        }
    }
}

/// Remove `trace` only if it is still the registration `id`
fn remove_owned(map: &mut PendingMap, trace: &str, id: u64) -> bool {
    if map.get(trace).is_some_and(|entry| entry.id == id) {
        map.remove(trace);
        debug!("Reclaimed abandoned request {}", trace);
        true
    } else {
        false
    }
}

/// Maps trace ids of outstanding requests to their waiters
///
/// Each trace is resolved at most once; late or duplicate responses are
/// dropped.
#[derive(Default)]
pub struct CorrelationRegistry {
    /// Pending requests keyed by trace id
    pending: Arc<RwLock<PendingMap>>,
    /// Next registration id
    next_id: AtomicU64,
    /// Set once the registry has been cancelled
    closed: AtomicBool,
}

impl CorrelationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request under `trace` before it is transmitted
    pub async fn register(&self, trace: impl Into<String>, code: i64, request: Value) -> Result<PendingRequest> {
        let trace = trace.into();
        let (responder, response_rx) = oneshot::channel();

        let mut pending = self.pending.write().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(HookwireError::Cancelled);
        }
        if pending.contains_key(&trace) {
            return Err(HookwireError::Protocol(format!("Trace {} already pending", trace)));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        pending.insert(trace.clone(), PendingEntry { id, code, request, responder });
        debug!("Registered pending request {} (type {})", trace, code);

        Ok(PendingRequest {
            trace,
            id,
            response_rx,
            registry: Arc::downgrade(&self.pending),
            settled: false,
        })
    }

    /// Fulfil the request registered under `trace`
    ///
    /// Returns `false` if nothing is waiting on that trace.
    pub async fn resolve(&self, trace: &str, response: Envelope) -> bool {
        let entry = self.pending.write().await.remove(trace);

        match entry {
            Some(entry) => {
                debug!("Resolved request {} (type {})", trace, entry.code);
                if entry.responder.send(response).is_err() {
                    warn!("Response for {} arrived after its waiter went away", trace);
                }
                true
            }
            None => {
                debug!("Dropping response for unknown trace {}", trace);
                false
            }
        }
    }

    /// Wait for the response to `pending`
    ///
    /// Returns the response `data`, or `None` once `limit` elapses, in which
    /// case the entry is removed. Dropping this future also removes it.
    pub async fn wait(&self, mut pending: PendingRequest, limit: Duration) -> Result<Option<Value>> {
        match timeout(limit, &mut pending.response_rx).await {
            Ok(Ok(envelope)) => {
                pending.settled = true;
                Ok(Some(envelope.data))
            }
            Ok(Err(_)) => {
                pending.settled = true;
                Err(HookwireError::Cancelled)
            }
            Err(_) => {
                self.release(&mut pending).await;
                debug!("Request {} timed out after {:?}", pending.trace, limit);
                Ok(None)
            }
        }
    }

    /// Withdraw a request that will not be waited on
    pub async fn abandon(&self, mut pending: PendingRequest) -> bool {
        self.release(&mut pending).await
    }

    async fn release(&self, pending: &mut PendingRequest) -> bool {
        let removed = remove_owned(&mut *self.pending.write().await, &pending.trace, pending.id);
        pending.settled = true;
        removed
    }

    /// Remove an entry without resolving it
    pub async fn forget(&self, trace: &str) -> bool {
        self.pending.write().await.remove(trace).is_some()
    }

    /// Fail every outstanding wait and refuse new registrations
    pub async fn cancel_all(&self) -> usize {
        let mut pending = self.pending.write().await;
        self.closed.store(true, Ordering::Release);
        let count = pending.len();
        pending.clear();
        if count > 0 {
            debug!("Cancelled {} pending requests", count);
        }
        count
    }

    /// Trace ids and requests currently outstanding
    pub async fn pending(&self) -> Vec<(String, Value)> {
        self.pending
            .read()
            .await
            .iter()
            .map(|(trace, entry)| (trace.clone(), entry.request.clone()))
            .collect()
    }

    /// Number of outstanding requests
    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// True when nothing is outstanding
    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}
