use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};
use std::time::Duration;

use palantir_core::events::CorrelationId;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::{
    surface::{FrameChannel, FrameSurface},
    FrameError,
};

/// How a loopback surface answers the load signal.
#[derive(Debug, Clone)]
pub enum LoadBehavior {
    /// Load completes as soon as the sub-context is mounted.
    Immediate,
    /// Load completes after the given delay.
    After(Duration),
    /// The load signal never fires (sub-context hangs forever).
    Never,
    /// Load fails with the given reason.
    Fail(String),
}

/// In-process [`FrameSurface`] for tests and smoke runs: scriptable load
/// behavior, observable outbound traffic, injectable inbound replies, and a
/// [`LoopbackSurface::sever`] switch simulating a sub-context unload.
pub struct LoopbackSurface {
    behavior: LoadBehavior,
    mount_count: AtomicUsize,
    mounted_endpoint: Mutex<Option<String>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    held_load: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    outbound_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl LoopbackSurface {
    pub fn new() -> Self {
        Self::with_load(LoadBehavior::Immediate)
    }

    pub fn with_load(behavior: LoadBehavior) -> Self {
        Self {
            behavior,
            mount_count: AtomicUsize::new(0),
            mounted_endpoint: Mutex::new(None),
            inbound_tx: Mutex::new(None),
            held_load: Mutex::new(None),
            outbound_rx: tokio::sync::Mutex::new(None),
        }
    }

    /// Number of times a sub-context was mounted on this surface.
    pub fn mount_count(&self) -> usize {
        self.mount_count.load(Ordering::SeqCst)
    }

    /// Endpoint of the most recent mount.
    pub fn mounted_endpoint(&self) -> Option<String> {
        self.mounted_endpoint.lock().ok().and_then(|e| e.clone())
    }

    /// Inject one raw message from the simulated sub-context.
    pub fn push_inbound(&self, message: Value) {
        if let Ok(guard) = self.inbound_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(message);
            }
        }
    }

    /// Inject a well-formed success reply for `id`.
    pub fn reply_success(&self, id: &CorrelationId, operation: &str, payload: Option<Value>) {
        self.push_inbound(reply(id, operation, "_SUCCESS", payload));
    }

    /// Inject a well-formed error reply for `id`.
    pub fn reply_error(&self, id: &CorrelationId, operation: &str, payload: Option<Value>) {
        self.push_inbound(reply(id, operation, "_ERROR", payload));
    }

    /// Wait for the next outbound wire event from the host.
    pub async fn next_outbound(&self) -> Option<Value> {
        let mut guard = self.outbound_rx.lock().await;
        match guard.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Non-blocking variant for "nothing was emitted" assertions.
    pub fn try_next_outbound(&self) -> Option<Value> {
        let mut guard = self.outbound_rx.try_lock().ok()?;
        guard.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Simulate the sub-context unloading: the outbound channel closes and
    /// no further inbound messages can be injected.
    pub fn sever(&self) {
        if let Ok(mut guard) = self.inbound_tx.lock() {
            guard.take();
        }
        if let Ok(mut guard) = self.outbound_rx.try_lock() {
            guard.take();
        }
    }
}

impl Default for LoopbackSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSurface for LoopbackSurface {
    fn mount(&self, endpoint: &str) -> Result<FrameChannel, FrameError> {
        let (loaded_tx, loaded_rx) = oneshot::channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        self.mount_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.mounted_endpoint.lock() {
            *guard = Some(endpoint.to_string());
        }
        if let Ok(mut guard) = self.inbound_tx.lock() {
            *guard = Some(in_tx);
        }
        let mut outbound = self
            .outbound_rx
            .try_lock()
            .map_err(|_| FrameError::Surface {
                reason: "loopback outbound channel is busy".to_string(),
            })?;
        *outbound = Some(out_rx);
        drop(outbound);

        match &self.behavior {
            LoadBehavior::Immediate => {
                let _ = loaded_tx.send(Ok(()));
            }
            LoadBehavior::After(delay) => {
                let delay = *delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = loaded_tx.send(Ok(()));
                });
            }
            LoadBehavior::Never => {
                // Keep the sender alive so the signal stays pending instead
                // of resolving to failure.
                if let Ok(mut guard) = self.held_load.lock() {
                    *guard = Some(loaded_tx);
                }
            }
            LoadBehavior::Fail(reason) => {
                let _ = loaded_tx.send(Err(reason.clone()));
            }
        }

        Ok(FrameChannel {
            loaded: loaded_rx,
            inbound: in_rx,
            outbound: out_tx,
        })
    }
}

fn reply(id: &CorrelationId, operation: &str, suffix: &str, payload: Option<Value>) -> Value {
    match payload {
        Some(payload) => json!({
            "type": format!("@frame/{operation}{suffix}"),
            "id": id.as_str(),
            "payload": payload,
        }),
        None => json!({
            "type": format!("@frame/{operation}{suffix}"),
            "id": id.as_str(),
        }),
    }
}
