use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use palantir_core::events::{CorrelationId, FrameEvent};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tracing::{error, warn};

const BROADCAST_CAPACITY: usize = 64;

/// The matching inbound event can no longer arrive (the frame handle went
/// away or the listener table was torn down).
#[derive(Debug, Error, PartialEq, Eq)]
#[error("listener lapsed before a matching event arrived")]
pub struct SubscriptionLapsed;

/// Correlation-keyed listener table plus a broadcast fan-out for out-of-band
/// frame events. One-shot listeners are removed on first match; the
/// subscription handle removes its entry on drop, so registration and
/// deregistration stay symmetric on every call path.
pub(crate) struct ListenerRegistry {
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<FrameEvent>>>,
    broadcast: broadcast::Sender<FrameEvent>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Arc<Self> {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            broadcast,
        })
    }

    pub(crate) fn subscribe_once(self: &Arc<Self>, id: CorrelationId) -> FrameSubscription {
        let (tx, rx) = oneshot::channel();
        match self.pending.lock() {
            Ok(mut pending) => {
                // Ids are unique while in flight; a collision means the
                // previous caller already lapsed.
                if pending.insert(id.clone(), tx).is_some() {
                    warn!(correlation = %id, "replaced listener for in-flight correlation id");
                }
            }
            // Dropping `tx` here makes the subscription lapse immediately.
            Err(err) => error!("listener table poisoned: {err}"),
        }
        FrameSubscription {
            id,
            rx,
            registry: Arc::downgrade(self),
        }
    }

    pub(crate) fn subscribe_all(&self) -> broadcast::Receiver<FrameEvent> {
        self.broadcast.subscribe()
    }

    /// Deliver one parsed inbound event: resolve the matching one-shot
    /// listener (if any), then fan out to durable subscribers. An event whose
    /// id matches nothing is a no-op for the pending table.
    pub(crate) fn dispatch(&self, event: FrameEvent) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(tx) = pending.remove(&event.id) {
                // The waiter may have lapsed; delivery stays best-effort.
                let _ = tx.send(event.clone());
            }
        }
        // No durable subscribers is fine.
        let _ = self.broadcast.send(event);
    }

    fn deregister(&self, id: &CorrelationId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(id);
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

/// Handle to a one-shot inbound listener. Dropping it removes the listener.
pub struct FrameSubscription {
    id: CorrelationId,
    rx: oneshot::Receiver<FrameEvent>,
    registry: Weak<ListenerRegistry>,
}

impl FrameSubscription {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Wait for the matching inbound event. At most one event is ever
    /// delivered per subscription.
    pub async fn wait(mut self) -> Result<FrameEvent, SubscriptionLapsed> {
        (&mut self.rx).await.map_err(|_| SubscriptionLapsed)
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(&self.id);
        }
    }
}
