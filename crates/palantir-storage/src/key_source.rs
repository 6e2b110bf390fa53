use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// 256-bit symmetric key sealing session facts at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealingKey {
    pub bytes: [u8; 32],
}

#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("stored key is invalid: {0}")]
    Invalid(String),
}

/// Provides the sealing key (OS keychain in production; memory in tests).
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn load_or_generate(&self) -> Result<SealingKey, KeySourceError>;
}

/// OS keyring-backed source. Generates and stores a key on first use.
pub struct KeyringSource {
    service: String,
    account: String,
}

impl KeyringSource {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeySource for KeyringSource {
    async fn load_or_generate(&self) -> Result<SealingKey, KeySourceError> {
        // Keyring operations are synchronous; wrapped in async for trait
        // compatibility.
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|err| KeySourceError::Keyring(err.to_string()))?;

        if let Ok(secret) = entry.get_password() {
            return decode_key(&secret);
        }

        let key = generate_key();
        entry
            .set_password(&STANDARD.encode(key.bytes))
            .map_err(|err| KeySourceError::Keyring(err.to_string()))?;
        Ok(key)
    }
}

/// In-memory source for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct EphemeralKeySource {
    inner: Arc<Mutex<Option<SealingKey>>>,
}

#[async_trait]
impl KeySource for EphemeralKeySource {
    async fn load_or_generate(&self) -> Result<SealingKey, KeySourceError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeySourceError::Invalid(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let key = generate_key();
        *guard = Some(key.clone());
        Ok(key)
    }
}

fn generate_key() -> SealingKey {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SealingKey { bytes }
}

fn decode_key(secret: &str) -> Result<SealingKey, KeySourceError> {
    let bytes = STANDARD
        .decode(secret)
        .map_err(|err| KeySourceError::Invalid(err.to_string()))?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|actual: Vec<u8>| {
            KeySourceError::Invalid(format!("expected 32 bytes, got {}", actual.len()))
        })?;
    Ok(SealingKey { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_source_is_stable_across_calls() {
        let source = EphemeralKeySource::default();
        let first = source.load_or_generate().await.unwrap();
        let second = source.load_or_generate().await.unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = decode_key("abcd").expect_err("short keys must be rejected");
        assert!(matches!(err, KeySourceError::Invalid(_)));
    }

    #[test]
    fn decode_round_trips() {
        let key = generate_key();
        let decoded = decode_key(&STANDARD.encode(key.bytes)).expect("decode");
        assert_eq!(decoded.bytes, key.bytes);
    }
}
