use std::path::PathBuf;

use color_eyre::Result;
use dirs::data_dir;
use palantir_storage::{encrypted_store::EncryptedFileStore, key_source::KeyringSource};
use tracing::debug;

use crate::config::Config;

/// Resolve the default data directory for the session store.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("palantir"))
}

/// Build the production encrypted store using the OS keychain.
pub fn production_store() -> Result<EncryptedFileStore<KeyringSource>> {
    let root = default_data_dir()?;
    debug!(?root, "initializing encrypted session store");
    Ok(EncryptedFileStore::new(
        root,
        KeyringSource::new("palantir-cli", "session-key"),
    ))
}

/// Build a store honoring config overrides.
pub fn store_from_config(config: &Config) -> Result<EncryptedFileStore<KeyringSource>> {
    if let Some(root) = &config.data_dir {
        debug!(?root, "initializing encrypted session store (config override)");
        return Ok(EncryptedFileStore::new(
            root.clone(),
            KeyringSource::new("palantir-cli", "session-key"),
        ));
    }

    production_store()
}

/// Helper for tests: a store rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_store(
    root: impl Into<PathBuf>,
) -> EncryptedFileStore<palantir_storage::key_source::EphemeralKeySource> {
    EncryptedFileStore::new(
        root,
        palantir_storage::key_source::EphemeralKeySource::default(),
    )
}
