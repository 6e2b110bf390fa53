use std::sync::{Arc, Mutex};

use palantir_core::events::{AppEvent, CorrelationId, FrameEvent};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::{
    endpoint::FrameConfig,
    registry::{FrameSubscription, ListenerRegistry},
    surface::{FrameChannel, FrameSurface},
    FrameError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadyState {
    Pending,
    Ready,
    Failed(String),
}

struct MountedChannel {
    outbound: mpsc::UnboundedSender<Value>,
}

/// Owns the sub-context element and the two message streams.
///
/// At most one sub-context exists per handle; the readiness signal resolves
/// exactly once, to success or failure, and never resets.
pub struct SecureFrame {
    config: FrameConfig,
    surface: Arc<dyn FrameSurface>,
    mounted: Mutex<Option<MountedChannel>>,
    ready_tx: watch::Sender<ReadyState>,
    ready_rx: watch::Receiver<ReadyState>,
    registry: Arc<ListenerRegistry>,
}

impl SecureFrame {
    pub fn new(config: FrameConfig, surface: Arc<dyn FrameSurface>) -> Self {
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Pending);
        Self {
            config,
            surface,
            mounted: Mutex::new(None),
            ready_tx,
            ready_rx,
            registry: ListenerRegistry::new(),
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Mount the sub-context if it does not exist yet. Idempotent: repeat
    /// calls while the first load is still pending share the same readiness
    /// signal and never produce a second sub-context.
    pub fn create(&self) -> Result<(), FrameError> {
        let mut mounted = self
            .mounted
            .lock()
            .map_err(|_| FrameError::ChannelUnavailable)?;
        if mounted.is_some() {
            return Ok(());
        }

        let channel = match self.surface.mount(&self.config.endpoint()) {
            Ok(channel) => channel,
            Err(err) => {
                let _ = self.ready_tx.send(ReadyState::Failed(err.to_string()));
                return Err(err);
            }
        };
        let FrameChannel {
            loaded,
            inbound,
            outbound,
        } = channel;
        *mounted = Some(MountedChannel { outbound });
        drop(mounted);

        let ready_tx = self.ready_tx.clone();
        tokio::spawn(async move {
            let state = match loaded.await {
                Ok(Ok(())) => ReadyState::Ready,
                Ok(Err(reason)) => {
                    warn!(%reason, "sub-context reported a load failure");
                    ReadyState::Failed(reason)
                }
                Err(_) => ReadyState::Failed("load signal dropped".to_string()),
            };
            let _ = ready_tx.send(state);
        });

        let registry = Arc::clone(&self.registry);
        tokio::spawn(dispatch_inbound(inbound, registry));

        Ok(())
    }

    /// Wait for the sub-context to finish loading. Resolves immediately once
    /// the single readiness result is known.
    pub async fn ready(&self) -> Result<(), FrameError> {
        let mut rx = self.ready_rx.clone();
        let state = rx
            .wait_for(|state| *state != ReadyState::Pending)
            .await
            .map_err(|_| FrameError::LoadFailed {
                reason: "frame handle dropped".to_string(),
            })?;
        match &*state {
            ReadyState::Failed(reason) => Err(FrameError::LoadFailed {
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Whether a live sub-context target exists to receive messages.
    pub fn is_live(&self) -> bool {
        self.mounted
            .lock()
            .map(|mounted| {
                mounted
                    .as_ref()
                    .is_some_and(|channel| !channel.outbound.is_closed())
            })
            .unwrap_or(false)
    }

    /// Validate and send one outbound event to the sub-context.
    pub fn emit(&self, event: &AppEvent) -> Result<(), FrameError> {
        event.validate()?;
        let mounted = self
            .mounted
            .lock()
            .map_err(|_| FrameError::ChannelUnavailable)?;
        let channel = mounted.as_ref().ok_or(FrameError::ChannelUnavailable)?;
        channel
            .outbound
            .send(event.to_wire())
            .map_err(|_| FrameError::ChannelUnavailable)
    }

    /// Register a one-shot listener for the inbound event carrying `id`.
    /// The listener self-deregisters after the first match or when the
    /// returned handle is dropped.
    pub fn subscribe_once(&self, id: &CorrelationId) -> FrameSubscription {
        self.registry.subscribe_once(id.clone())
    }

    /// Durable subscription to every inbound frame event, for out-of-band
    /// notifications not tied to a single request.
    pub fn subscribe_all(&self) -> broadcast::Receiver<FrameEvent> {
        self.registry.subscribe_all()
    }

    /// Number of one-shot listeners currently registered.
    pub fn pending_listeners(&self) -> usize {
        self.registry.pending_len()
    }
}

/// Parse raw inbound messages and hand them to the registry. Anything
/// malformed or outside the frame-event namespace is dropped without
/// matching a listener.
async fn dispatch_inbound(
    mut inbound: mpsc::UnboundedReceiver<Value>,
    registry: Arc<ListenerRegistry>,
) {
    while let Some(raw) = inbound.recv().await {
        match FrameEvent::parse(&raw) {
            Some(event) => registry.dispatch(event),
            None => debug!("ignoring malformed inbound message"),
        }
    }
}
