//! The frame handle: lifecycle and message plumbing for the isolated
//! sub-context that performs wallet authentication out of the host's view.
//!
//! The host and the sub-context exchange only serializable messages, in two
//! disjoint type-tag namespaces (`@app/` outbound, `@frame/` inbound). This
//! crate owns mounting the sub-context on a [`FrameSurface`], the
//! single-resolution readiness signal, schema-validated emission, and the
//! correlation-keyed listener registry that turns the inbound broadcast into
//! one-shot subscriptions.

mod endpoint;
mod frame;
mod loopback;
mod registry;
mod surface;

use palantir_core::events::SchemaViolation;
use thiserror::Error;

pub use endpoint::{FrameConfig, NetworkEndpoint, DEFAULT_SECURE_SITE};
pub use frame::SecureFrame;
pub use loopback::{LoadBehavior, LoopbackSurface};
pub use registry::{FrameSubscription, SubscriptionLapsed};
pub use surface::{FrameChannel, FrameSurface, HeadlessSurface};

/// Errors raised by the frame handle.
#[derive(Debug, Error)]
pub enum FrameError {
    /// An outbound event failed structural validation before send.
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    /// The sub-context has no live target to receive messages.
    #[error("no live sub-context to receive messages")]
    ChannelUnavailable,
    /// The sub-context reported a load failure.
    #[error("sub-context failed to load: {reason}")]
    LoadFailed { reason: String },
    /// The hosting surface could not mount a sub-context.
    #[error("surface cannot host a sub-context: {reason}")]
    Surface { reason: String },
}
