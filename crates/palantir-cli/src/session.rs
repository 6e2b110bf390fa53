use std::sync::Arc;

use color_eyre::Result;
use palantir_bridge::SessionCache;
use palantir_core::store::SessionStore;

use crate::{cli::SessionCommand, config, storage};

/// Execute a session subcommand against the encrypted store.
pub async fn handle(cmd: SessionCommand, config: &config::Config) -> Result<()> {
    let store: Arc<dyn SessionStore> = Arc::new(storage::store_from_config(config)?);
    let cache = SessionCache::new(store);

    match cmd {
        SessionCommand::Show => show(&cache).await,
        SessionCommand::Clear => {
            cache
                .clear_auth_login_cache()
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            println!("Cleared the auth-login cache.");
            Ok(())
        }
    }
}

async fn show(cache: &SessionCache) -> Result<()> {
    let email = cache
        .email()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let login_used = cache
        .login_email_used()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let chain = cache
        .last_used_chain_id()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let social = cache
        .social_username()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let networks = cache
        .smart_account_networks()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let connector = cache
        .connector_id()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;

    println!("email:                {}", display(email));
    println!("email login used:     {login_used}");
    println!(
        "last used chain:      {}",
        chain.map_or_else(|| "(unknown)".to_string(), |id| id.to_string())
    );
    println!("social username:      {}", display(social));
    println!(
        "smart-account chains: {}",
        if networks.is_empty() {
            "(none)".to_string()
        } else {
            networks
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!("connector:            {}", display(connector));
    Ok(())
}

fn display(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(unset)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    #[tokio::test]
    async fn show_and_clear_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store: Arc<dyn SessionStore> = Arc::new(storage::test_store(dir.path()));
        let cache = SessionCache::new(store);

        cache
            .record_login_success(Some("user@example.com"))
            .await
            .expect("seed");
        cache.set_last_used_chain_id(137).await.expect("seed chain");

        show(&cache).await.expect("show should succeed");

        cache.clear_auth_login_cache().await.expect("clear");
        assert_eq!(cache.email().await.expect("read"), None);
        assert_eq!(cache.last_used_chain_id().await.expect("read"), None);
    }
}
