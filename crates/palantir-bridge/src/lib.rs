//! The RPC bridge: correlated, timeout-bounded, cancellable calls into the
//! isolated wallet sub-context, plus the session cache the host reads
//! between reloads.
//!
//! The bridge never blocks the host: readiness waits are bounded and
//! retried, only user-interactive operations carry a response deadline, and
//! an unreachable sub-context resolves calls as [`CallOutcome::Unavailable`]
//! rather than erroring.
//!
//! [`CallOutcome::Unavailable`]: palantir_core::outcome::CallOutcome

mod bridge;
mod call;
pub mod registry;
mod session;
#[cfg(test)]
mod testing;

use palantir_frame::FrameError;
use thiserror::Error;

pub use bridge::AuthBridge;
pub use session::SessionCache;

/// Errors surfaced to bridge callers. Remote-reported failures of non-RPC
/// operations are deliberately not here: they resolve as recovered outcomes
/// (see [`palantir_core::outcome::CallOutcome`]).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Transport or schema failure raised while emitting.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// A generic RPC request was cancelled while in flight.
    #[error("request was aborted")]
    RequestAborted,
    /// An email flow was re-triggered inside the retry window.
    #[error("email login attempted again too soon; retry in {retry_in_secs}s")]
    EmailRateLimited { retry_in_secs: i64 },
    /// A payload did not match the shape the operation requires.
    #[error("payload for {operation} did not match the expected shape: {reason}")]
    Payload {
        operation: &'static str,
        reason: String,
    },
}
