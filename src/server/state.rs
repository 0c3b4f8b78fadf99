//! Shared application state.

use crate::config::GatewayConfig;
use crate::core::proxy::{ProxyService, ProxySettings};
use crate::core::router::{CooldownTable, ProviderRouter};
use crate::core::types::ProviderRecord;
use crate::storage::{MemoryProviderStore, ProviderStore};
use crate::utils::crypto;
use crate::utils::error::Result;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct AppState {
    pub config: GatewayConfig,
    pub store: Arc<MemoryProviderStore>,
    /// None when the master key is missing: the gateway boots disabled and
    /// the proxy routes answer 503 until a key is configured.
    pub proxy: Option<Arc<ProxyService>>,
}

impl AppState {
    pub fn build(config: GatewayConfig) -> Result<Self> {
        let store = Arc::new(MemoryProviderStore::new());

        let proxy = match config.master_key.clone() {
            Some(master_key) => {
                seed_providers(&store, &config, &master_key)?;
                let cooldowns = Arc::new(CooldownTable::new(config.proxy.cooldown()));
                let router = Arc::new(
                    ProviderRouter::new(
                        store.clone() as Arc<dyn ProviderStore>,
                        cooldowns,
                        master_key,
                    )
                    .with_error_threshold(config.proxy.error_threshold),
                );
                let settings = ProxySettings {
                    max_attempts: config.proxy.max_attempts,
                    upstream_timeout: config.proxy.upstream_timeout(),
                };
                Some(Arc::new(ProxyService::new(
                    router,
                    store.clone() as Arc<dyn ProviderStore>,
                    settings,
                )?))
            }
            None => {
                warn!("GATEWAY_MASTER_KEY is not set; gateway routes are disabled");
                None
            }
        };

        Ok(Self {
            config,
            store,
            proxy,
        })
    }

    pub fn enabled(&self) -> bool {
        self.proxy.is_some()
    }
}

/// Encrypt and install configured providers into the directory.
fn seed_providers(
    store: &MemoryProviderStore,
    config: &GatewayConfig,
    master_key: &[u8],
) -> Result<()> {
    for seed in &config.providers {
        let encrypted = crypto::encrypt_credential(master_key, &seed.api_key)?;
        let record = ProviderRecord {
            id: Uuid::new_v4(),
            tenant_id: seed.tenant_id,
            name: seed.name.clone(),
            family: seed.family,
            base_url: seed.base_url.clone(),
            api_key_encrypted: encrypted,
            models: seed.models.clone(),
            weight: seed.weight,
            active: true,
            error_count: 0,
            last_error_at: None,
            last_used_at: None,
            max_rpm: seed.max_rpm,
        };
        info!(
            provider = %record.name,
            family = %record.family,
            key = %crypto::display_prefix(&seed.api_key),
            "seeded provider"
        );
        store.insert_provider(record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSeed;
    use crate::core::types::ProviderFamily;

    #[test]
    fn test_build_without_master_key_is_disabled() {
        let state = AppState::build(GatewayConfig::default()).unwrap();
        assert!(!state.enabled());
    }

    #[tokio::test]
    async fn test_build_with_master_key_seeds_providers() {
        let mut config = GatewayConfig::default();
        config.master_key = Some(vec![1u8; 32]);
        config.providers.push(ProviderSeed {
            name: "seeded".into(),
            tenant_id: Uuid::new_v4(),
            family: ProviderFamily::Anthropic,
            base_url: "https://api.anthropic.com".into(),
            api_key: "sk-ant-secret".into(),
            models: vec!["claude-3-5-sonnet".into()],
            weight: 2,
            max_rpm: None,
        });
        let tenant = config.providers[0].tenant_id;

        let state = AppState::build(config).unwrap();
        assert!(state.enabled());

        let listed = state
            .store
            .list_active(tenant, ProviderFamily::Anthropic)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        // Stored credential is the encrypted blob, not the plaintext.
        assert_ne!(listed[0].api_key_encrypted, "sk-ant-secret");
        assert!(!listed[0].api_key_encrypted.is_empty());
    }
}
