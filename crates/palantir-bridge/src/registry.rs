//! Process-scoped sharing of one bridge instance.
//!
//! The bridge itself is an explicitly constructed value; nothing here is
//! created lazily. Callers that want "one bridge per process" install the
//! instance once during startup and tear it down when the host goes away.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use thiserror::Error;

use crate::bridge::AuthBridge;

static SHARED: OnceLock<Mutex<Option<Arc<AuthBridge>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<AuthBridge>>> {
    SHARED.get_or_init(|| Mutex::new(None))
}

/// A bridge is already installed; tear it down first.
#[derive(Debug, Error)]
#[error("a shared bridge is already installed")]
pub struct AlreadyInstalled;

/// Install the process-shared bridge. Fails if one is already installed.
pub fn install(bridge: Arc<AuthBridge>) -> Result<(), AlreadyInstalled> {
    let mut slot = slot().lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(AlreadyInstalled);
    }
    *slot = Some(bridge);
    Ok(())
}

/// The currently installed bridge, if any.
pub fn current() -> Option<Arc<AuthBridge>> {
    slot()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Remove and return the installed bridge. Safe to call when none is
/// installed.
pub fn teardown() -> Option<Arc<AuthBridge>> {
    slot().lock().unwrap_or_else(PoisonError::into_inner).take()
}

#[cfg(test)]
mod tests {
    use palantir_frame::LoadBehavior;

    use super::*;
    use crate::testing::harness;

    #[tokio::test]
    async fn install_current_teardown_lifecycle() {
        // One test owns the whole lifecycle: the slot is process-global.
        let h = harness(LoadBehavior::Immediate);

        assert!(current().is_none());
        install(Arc::clone(&h.bridge)).expect("first install");
        assert!(current().is_some());
        assert!(install(Arc::clone(&h.bridge)).is_err());

        teardown().expect("installed bridge");
        assert!(current().is_none());
        assert!(teardown().is_none());

        // After teardown a replacement can be installed.
        install(h.bridge).expect("reinstall");
        teardown();
    }
}
