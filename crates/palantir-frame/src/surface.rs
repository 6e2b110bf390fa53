use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::FrameError;

/// Channel endpoints handed to the frame when a sub-context is mounted.
pub struct FrameChannel {
    /// Resolves exactly once with the load result of the sub-context.
    pub loaded: oneshot::Receiver<Result<(), String>>,
    /// Raw messages emitted by the sub-context.
    pub inbound: mpsc::UnboundedReceiver<Value>,
    /// Raw messages delivered to the sub-context. Closed when the
    /// sub-context unloads, which is how the frame detects a dead target.
    pub outbound: mpsc::UnboundedSender<Value>,
}

/// A rendering surface able to host an embedded sub-context and carry
/// cross-context messages. External collaborator: the frame never assumes
/// anything about how messages travel, only that the returned channels obey
/// the [`FrameChannel`] contract.
pub trait FrameSurface: Send + Sync {
    /// Mount the sub-context at `endpoint`. Load completion is reported
    /// asynchronously through the returned channel.
    fn mount(&self, endpoint: &str) -> Result<FrameChannel, FrameError>;
}

/// Surface for environments that cannot render an embedded context at all.
/// Mounting always fails, so every bridge call resolves unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurface;

impl FrameSurface for HeadlessSurface {
    fn mount(&self, _endpoint: &str) -> Result<FrameChannel, FrameError> {
        Err(FrameError::Surface {
            reason: "environment cannot render an embedded context".to_string(),
        })
    }
}
