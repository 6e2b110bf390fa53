use std::time::Duration;

use palantir_core::{
    events::{AppEvent, AppEventKind, CorrelationId, ReplyStatus},
    messages::rpc,
    outcome::CallOutcome,
};
use palantir_frame::FrameSubscription;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{bridge::AuthBridge, BridgeError};

/// Upper bound on one readiness wait.
const READY_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);
/// Pause between readiness attempts.
const READY_RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// Readiness retry budget.
const READY_ATTEMPTS: u32 = 3;
/// Response deadline applied to user-interactive operations only.
const INTERACTIVE_DEADLINE: Duration = Duration::from_secs(30);

/// A generic RPC request currently awaiting its reply.
pub(crate) struct OpenRpcRequest {
    pub(crate) id: CorrelationId,
    pub(crate) method: String,
    pub(crate) cancel: CancellationToken,
}

impl AuthBridge {
    /// Issue one correlated call: gate on readiness (bounded retry), emit
    /// the event, then wait for the matching reply under the per-kind
    /// deadline policy. Unreachability resolves as
    /// [`CallOutcome::Unavailable`]; only emit failures and RPC aborts are
    /// errors.
    pub(crate) async fn call(
        &self,
        kind: AppEventKind,
        payload: Option<Value>,
    ) -> Result<CallOutcome<Value>, BridgeError> {
        if !self.await_frame_ready().await {
            return Ok(CallOutcome::Unavailable);
        }
        if !self.frame().is_live() {
            debug!(
                operation = kind.operation(),
                "no live sub-context target at dispatch"
            );
            return Ok(CallOutcome::Unavailable);
        }

        let event = AppEvent::new(kind, payload);
        let id = event.id.clone();
        let cancel = CancellationToken::new();
        // Register before emitting so a fast reply cannot slip past.
        let subscription = self.frame().subscribe_once(&id);
        info!(operation = kind.operation(), correlation = %id, "dispatching app event");
        self.frame().emit(&event)?;

        if kind == AppEventKind::RpcRequest {
            let method = event
                .payload
                .as_ref()
                .and_then(|payload| payload.get("method"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.track_rpc(OpenRpcRequest {
                id: id.clone(),
                method,
                cancel: cancel.clone(),
            });
        }

        let outcome = self.await_reply(kind, subscription, &cancel).await;

        if kind == AppEventKind::RpcRequest {
            self.untrack_rpc(&id);
        }
        outcome
    }

    /// Wait for the sub-context to become ready, bounded per attempt and
    /// retried a fixed number of times with a fixed backoff.
    async fn await_frame_ready(&self) -> bool {
        for attempt in 1..=READY_ATTEMPTS {
            match tokio::time::timeout(READY_ATTEMPT_TIMEOUT, self.frame().ready()).await {
                Ok(Ok(())) => return true,
                Ok(Err(err)) => debug!(attempt, %err, "sub-context load failed"),
                Err(_) => debug!(attempt, "sub-context readiness attempt timed out"),
            }
            tokio::time::sleep(READY_RETRY_BACKOFF).await;
        }
        warn!("sub-context readiness attempts exhausted");
        false
    }

    async fn await_reply(
        &self,
        kind: AppEventKind,
        subscription: FrameSubscription,
        cancel: &CancellationToken,
    ) -> Result<CallOutcome<Value>, BridgeError> {
        let reply = subscription.wait();
        tokio::pin!(reply);
        let deadline = async {
            if kind.has_deadline() {
                tokio::time::sleep(INTERACTIVE_DEADLINE).await;
            } else {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(deadline);

        tokio::select! {
            event = &mut reply => Ok(match event {
                Ok(event) if event.status == ReplyStatus::Success => {
                    CallOutcome::Success(event.payload.unwrap_or(Value::Null))
                }
                Ok(event) => {
                    warn!(
                        operation = %event.operation,
                        correlation = %event.id,
                        "sub-context reported an error; absorbing"
                    );
                    CallOutcome::Recovered
                }
                Err(_) => CallOutcome::Unavailable,
            }),
            () = cancel.cancelled() => aborted(kind),
            () = &mut deadline => {
                warn!(operation = kind.operation(), "interactive operation deadline elapsed");
                self.notify_timeout();
                cancel.cancel();
                aborted(kind)
            }
        }
    }

    fn track_rpc(&self, request: OpenRpcRequest) {
        match self.open_rpc().lock() {
            Ok(mut open) => open.push(request),
            Err(err) => warn!("in-flight rpc table poisoned: {err}"),
        }
    }

    fn untrack_rpc(&self, id: &CorrelationId) {
        if let Ok(mut open) = self.open_rpc().lock() {
            open.retain(|request| request.id != *id);
        }
    }

    /// Number of generic RPC requests currently in flight.
    pub fn pending_rpc_requests(&self) -> usize {
        self.open_rpc().lock().map(|open| open.len()).unwrap_or(0)
    }

    /// Cancel every in-flight RPC request whose method is not in the safe
    /// allow-list, then clear the in-flight set unconditionally. Safe to call
    /// with nothing in flight; individual failures are logged, not raised.
    pub fn reject_all_pending(&self) {
        let drained: Vec<OpenRpcRequest> = match self.open_rpc().lock() {
            Ok(mut open) => open.drain(..).collect(),
            Err(err) => {
                warn!("in-flight rpc table poisoned: {err}");
                return;
            }
        };

        for request in drained {
            if rpc::is_safe_method(&request.method) {
                debug!(method = %request.method, "leaving safe rpc request pending");
                continue;
            }
            info!(method = %request.method, correlation = %request.id, "cancelling in-flight rpc request");
            request.cancel.cancel();
        }
    }
}

/// Cancellation policy: generic RPC requests reject, every other kind keeps
/// connect-style flows from throwing on abandoned timeouts.
fn aborted(kind: AppEventKind) -> Result<CallOutcome<Value>, BridgeError> {
    if kind == AppEventKind::RpcRequest {
        Err(BridgeError::RequestAborted)
    } else {
        Ok(CallOutcome::Unavailable)
    }
}
