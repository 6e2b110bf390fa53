//! Harness shared by the bridge scenario tests: a loopback surface standing
//! in for the sub-context, an in-memory session store, and a counter on the
//! timeout callback.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use palantir_core::{
    events::CorrelationId,
    store::{InMemorySessionStore, SessionStore},
};
use palantir_frame::{FrameConfig, FrameSurface, LoadBehavior, LoopbackSurface, SecureFrame};
use serde_json::Value;

use crate::{bridge::AuthBridge, session::SessionCache};

pub(crate) struct Harness {
    pub(crate) bridge: Arc<AuthBridge>,
    pub(crate) frame: Arc<SecureFrame>,
    pub(crate) surface: Arc<LoopbackSurface>,
    pub(crate) cache: SessionCache,
    pub(crate) timeouts: Arc<AtomicUsize>,
}

pub(crate) fn harness(load: LoadBehavior) -> Harness {
    let surface = Arc::new(LoopbackSurface::with_load(load));
    let frame_surface: Arc<dyn FrameSurface> = Arc::clone(&surface) as Arc<dyn FrameSurface>;
    let frame = Arc::new(SecureFrame::new(
        FrameConfig::new("proj-test", 1),
        frame_surface,
    ));
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

    let timeouts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&timeouts);
    let bridge = AuthBridge::new(Arc::clone(&frame), Arc::clone(&store))
        .with_timeout_handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    Harness {
        bridge: Arc::new(bridge),
        frame,
        surface,
        cache: SessionCache::new(store),
        timeouts,
    }
}

impl Harness {
    /// Next outbound wire event emitted by the bridge.
    pub(crate) async fn outbound(&self) -> Value {
        self.surface.next_outbound().await.expect("outbound event")
    }

    pub(crate) fn timeout_count(&self) -> usize {
        self.timeouts.load(Ordering::SeqCst)
    }

    pub(crate) fn reply_success(&self, outbound: &Value, operation: &str, payload: Option<Value>) {
        self.surface
            .reply_success(&correlation(outbound), operation, payload);
    }

    pub(crate) fn reply_error(&self, outbound: &Value, operation: &str, payload: Option<Value>) {
        self.surface
            .reply_error(&correlation(outbound), operation, payload);
    }
}

fn correlation(outbound: &Value) -> CorrelationId {
    CorrelationId::from(outbound["id"].as_str().expect("correlation id"))
}
