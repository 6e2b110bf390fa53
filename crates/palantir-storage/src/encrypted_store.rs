use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use palantir_core::store::{SessionStore, StoreError};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::key_source::{KeySource, SealingKey};

/// File-backed [`SessionStore`] holding one AES-GCM sealed blob per key.
/// Absent keys read back as `None`; deletes are idempotent.
pub struct EncryptedFileStore<K: KeySource> {
    root: PathBuf,
    key_source: K,
}

impl<K: KeySource> EncryptedFileStore<K> {
    pub fn new(root: impl Into<PathBuf>, key_source: K) -> Self {
        Self {
            root: root.into(),
            key_source,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Session keys are not valid filenames on every platform.
        self.root.join(URL_SAFE_NO_PAD.encode(key))
    }

    async fn cipher(&self) -> Result<Aes256Gcm, StoreError> {
        let key = self
            .key_source
            .load_or_generate()
            .await
            .map_err(|err| StoreError::storage(format!("key source: {err}")))?;
        build_cipher(&key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedValue {
    nonce: String,
    ciphertext: String,
}

#[async_trait]
impl<K: KeySource> SessionStore for EncryptedFileStore<K> {
    #[instrument(skip_all, fields(key))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(StoreError::storage)?;

        let cipher = self.cipher().await?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, value.as_bytes())
            .map_err(|err| StoreError::storage(format!("encrypt failed: {err}")))?;

        let sealed = SealedValue {
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        };
        write_sealed(&self.path_for(key), &sealed)
    }

    #[instrument(skip_all, fields(key))]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(sealed) = read_sealed(&self.path_for(key))? else {
            return Ok(None);
        };

        let cipher = self.cipher().await?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(sealed.nonce)
            .map_err(|err| StoreError::storage(format!("nonce decode failed: {err}")))?;
        let ciphertext = URL_SAFE_NO_PAD
            .decode(sealed.ciphertext)
            .map_err(|err| StoreError::storage(format!("ciphertext decode failed: {err}")))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|err| StoreError::storage(format!("decrypt failed: {err}")))?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|err| StoreError::storage(format!("stored value is not utf-8: {err}")))
    }

    #[instrument(skip_all, fields(key))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::storage(err)),
        }
    }
}

fn write_sealed(path: &Path, sealed: &SealedValue) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::storage("invalid storage path"))?;
    fs::create_dir_all(parent).map_err(StoreError::storage)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(StoreError::storage)?;
    let json = serde_json::to_vec(sealed).map_err(StoreError::storage)?;
    tmp.write_all(&json).map_err(StoreError::storage)?;
    tmp.flush().map_err(StoreError::storage)?;
    tmp.persist(path).map_err(|err| StoreError::storage(err.error))?;
    Ok(())
}

fn read_sealed(path: &Path) -> Result<Option<SealedValue>, StoreError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::storage(err)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(StoreError::storage)?;
    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(StoreError::storage)
}

fn build_cipher(key: &SealingKey) -> Result<Aes256Gcm, StoreError> {
    Aes256Gcm::new_from_slice(&key.bytes)
        .map_err(|err| StoreError::storage(format!("cipher init failed: {err}")))
}

#[cfg(test)]
mod tests {
    use palantir_core::store::keys;

    use super::*;
    use crate::key_source::EphemeralKeySource;

    fn test_store(root: &Path) -> EncryptedFileStore<EphemeralKeySource> {
        EncryptedFileStore::new(root, EphemeralKeySource::default())
    }

    #[tokio::test]
    async fn round_trip_encrypts_and_decrypts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());

        store
            .set(keys::EMAIL, "user@example.com")
            .await
            .expect("set");
        let value = store.get(keys::EMAIL).await.expect("get");
        assert_eq!(value.as_deref(), Some("user@example.com"));

        // Plaintext must not appear on disk.
        let raw = fs::read_to_string(store.path_for(keys::EMAIL)).expect("read sealed blob");
        assert!(!raw.contains("user@example.com"));
    }

    #[tokio::test]
    async fn absent_key_reads_back_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());
        assert_eq!(store.get(keys::SOCIAL_USERNAME).await.expect("get"), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());
        store.set(keys::LAST_USED_CHAIN, "137").await.expect("set");
        store.delete(keys::LAST_USED_CHAIN).await.expect("delete");
        store
            .delete(keys::LAST_USED_CHAIN)
            .await
            .expect("delete again");
        assert_eq!(store.get(keys::LAST_USED_CHAIN).await.expect("get"), None);
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());
        store.set(keys::LAST_USED_CHAIN, "1").await.expect("set");
        store.set(keys::LAST_USED_CHAIN, "137").await.expect("set");
        assert_eq!(
            store.get(keys::LAST_USED_CHAIN).await.expect("get").as_deref(),
            Some("137")
        );
    }
}
