use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by durable session-store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl StoreError {
    pub fn storage(reason: impl ToString) -> Self {
        Self::Storage {
            reason: reason.to_string(),
        }
    }
}

/// Durable key-value store for session facts. Flat string values, no TTL;
/// entries persist across process restarts until explicitly cleared.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Retrieve the value for a key; absent keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove a key and its value (idempotent).
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Well-known session-cache keys.
pub mod keys {
    /// Numeric chain id last connected or switched to.
    pub const LAST_USED_CHAIN: &str = "LAST_USED_CHAIN";
    /// Email address of the last successful login.
    pub const EMAIL: &str = "EMAIL";
    /// Present (any value) once an email login has been used.
    pub const EMAIL_LOGIN_USED: &str = "EMAIL_LOGIN_USED";
    /// Unix-millisecond timestamp of the last email login attempt.
    pub const LAST_EMAIL_LOGIN_AT: &str = "LAST_EMAIL_LOGIN_AT";
    /// Identity name returned by a social/farcaster login.
    pub const SOCIAL_USERNAME: &str = "SOCIAL_USERNAME";
    /// Comma-joined chain ids with smart accounts enabled.
    pub const SMART_ACCOUNT_NETWORKS: &str = "SMART_ACCOUNT_ENABLED_NETWORKS";
    /// Identifier of the last connector/wallet used.
    pub const CONNECTED_CONNECTOR: &str = "CONNECTED_CONNECTOR";

    /// Keys cleared together on disconnect, failed connectivity checks, and
    /// explicit sign-out.
    pub const AUTH_LOGIN_UNIT: [&str; 4] =
        [EMAIL_LOGIN_USED, EMAIL, LAST_USED_CHAIN, SOCIAL_USERNAME];
}

/// In-memory store for tests and smoke runs.
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|err| StoreError::storage(format!("lock poisoned: {err}")))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|err| StoreError::storage(format!("lock poisoned: {err}")))?;
        Ok(map.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|err| StoreError::storage(format!("lock poisoned: {err}")))?;
        map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_values() {
        let store = InMemorySessionStore::new();
        store.set(keys::EMAIL, "user@example.com").await.expect("set");
        assert_eq!(
            store.get(keys::EMAIL).await.expect("get").as_deref(),
            Some("user@example.com")
        );
    }

    #[tokio::test]
    async fn absent_key_is_none() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.get("missing").await.expect("get"), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemorySessionStore::new();
        store.set("k", "v").await.expect("set");
        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");
        assert_eq!(store.get("k").await.expect("get"), None);
    }
}
