use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use palantir_core::store::{keys, SessionStore, StoreError};
use tracing::instrument;

/// Typed accessors over the durable session store. Values are flat strings
/// on disk; this layer owns the encoding conventions (numeric chain id,
/// presence-coerced flags, comma-joined lists, millisecond timestamps).
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn SessionStore>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Chain id last connected or switched to. `None` means unknown.
    pub async fn last_used_chain_id(&self) -> Result<Option<u64>, StoreError> {
        Ok(self
            .store
            .get(keys::LAST_USED_CHAIN)
            .await?
            .and_then(|value| value.parse().ok()))
    }

    pub async fn set_last_used_chain_id(&self, chain_id: u64) -> Result<(), StoreError> {
        self.store
            .set(keys::LAST_USED_CHAIN, &chain_id.to_string())
            .await
    }

    pub async fn email(&self) -> Result<Option<String>, StoreError> {
        self.store.get(keys::EMAIL).await
    }

    /// Whether an email login has ever been used on this origin.
    pub async fn login_email_used(&self) -> Result<bool, StoreError> {
        Ok(self.store.get(keys::EMAIL_LOGIN_USED).await?.is_some())
    }

    pub async fn social_username(&self) -> Result<Option<String>, StoreError> {
        self.store.get(keys::SOCIAL_USERNAME).await
    }

    pub async fn connector_id(&self) -> Result<Option<String>, StoreError> {
        self.store.get(keys::CONNECTED_CONNECTOR).await
    }

    pub async fn set_connector_id(&self, connector: &str) -> Result<(), StoreError> {
        self.store.set(keys::CONNECTED_CONNECTOR, connector).await
    }

    /// When the last email login attempt was recorded, if one is pending.
    pub async fn last_email_login_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .store
            .get(keys::LAST_EMAIL_LOGIN_AT)
            .await?
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()))
    }

    /// Stamp an email login attempt (used to throttle re-triggering).
    pub async fn record_email_login_attempt(&self) -> Result<(), StoreError> {
        self.store
            .set(
                keys::LAST_EMAIL_LOGIN_AT,
                &Utc::now().timestamp_millis().to_string(),
            )
            .await
    }

    /// Record a completed login: remember the email, mark email login as
    /// used, and clear the pending attempt stamp.
    #[instrument(skip_all)]
    pub async fn record_login_success(&self, email: Option<&str>) -> Result<(), StoreError> {
        if let Some(email) = email {
            self.store.set(keys::EMAIL, email).await?;
        }
        self.store.set(keys::EMAIL_LOGIN_USED, "true").await?;
        self.store.delete(keys::LAST_EMAIL_LOGIN_AT).await
    }

    pub async fn record_social_login(&self, user_name: &str) -> Result<(), StoreError> {
        self.store.set(keys::SOCIAL_USERNAME, user_name).await
    }

    /// Chain ids with smart accounts enabled. Empty or absent ⇒ empty list.
    pub async fn smart_account_networks(&self) -> Result<Vec<u64>, StoreError> {
        Ok(self
            .store
            .get(keys::SMART_ACCOUNT_NETWORKS)
            .await?
            .map(|joined| {
                joined
                    .split(',')
                    .filter_map(|part| part.parse().ok())
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn set_smart_account_networks(&self, chain_ids: &[u64]) -> Result<(), StoreError> {
        let joined = chain_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.store.set(keys::SMART_ACCOUNT_NETWORKS, &joined).await
    }

    /// Delete the auth-login unit as one operation from the caller's view.
    /// Every key is attempted even if an earlier delete fails.
    #[instrument(skip_all)]
    pub async fn clear_auth_login_cache(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in keys::AUTH_LOGIN_UNIT {
            if let Err(err) = self.store.delete(key).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use palantir_core::store::InMemorySessionStore;

    use super::*;

    fn cache() -> SessionCache {
        SessionCache::new(Arc::new(InMemorySessionStore::new()))
    }

    #[tokio::test]
    async fn chain_id_round_trips() {
        let cache = cache();
        assert_eq!(cache.last_used_chain_id().await.expect("get"), None);

        cache.set_last_used_chain_id(137).await.expect("set");
        assert_eq!(cache.last_used_chain_id().await.expect("get"), Some(137));
    }

    #[tokio::test]
    async fn login_flag_coerces_from_presence() {
        let cache = cache();
        assert!(!cache.login_email_used().await.expect("get"));

        cache
            .record_login_success(Some("user@example.com"))
            .await
            .expect("record");
        assert!(cache.login_email_used().await.expect("get"));
        assert_eq!(
            cache.email().await.expect("get").as_deref(),
            Some("user@example.com")
        );
    }

    #[tokio::test]
    async fn login_success_clears_pending_attempt_stamp() {
        let cache = cache();
        cache.record_email_login_attempt().await.expect("stamp");
        assert!(cache.last_email_login_at().await.expect("get").is_some());

        cache.record_login_success(None).await.expect("record");
        assert_eq!(cache.last_email_login_at().await.expect("get"), None);
    }

    #[tokio::test]
    async fn network_list_round_trips() {
        let cache = cache();
        assert!(cache.smart_account_networks().await.expect("get").is_empty());

        cache
            .set_smart_account_networks(&[1, 137, 8453])
            .await
            .expect("set");
        assert_eq!(
            cache.smart_account_networks().await.expect("get"),
            vec![1, 137, 8453]
        );

        cache.set_smart_account_networks(&[]).await.expect("set");
        assert!(cache.smart_account_networks().await.expect("get").is_empty());
    }

    #[tokio::test]
    async fn clearing_auth_unit_removes_each_key() {
        let cache = cache();
        cache
            .record_login_success(Some("user@example.com"))
            .await
            .expect("login");
        cache.set_last_used_chain_id(137).await.expect("chain");
        cache.record_social_login("wizard").await.expect("social");
        cache.set_connector_id("walletconnect").await.expect("connector");

        cache.clear_auth_login_cache().await.expect("clear");

        assert_eq!(cache.email().await.expect("email"), None);
        assert!(!cache.login_email_used().await.expect("flag"));
        assert_eq!(cache.last_used_chain_id().await.expect("chain"), None);
        assert_eq!(cache.social_username().await.expect("social"), None);
        // The connector identifier is not part of the auth-login unit.
        assert_eq!(
            cache.connector_id().await.expect("connector").as_deref(),
            Some("walletconnect")
        );
    }
}
