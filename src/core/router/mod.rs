//! Provider selection and health transitions
//!
//! The router owns the cooldown table and is the only component that reads
//! or writes it. Selection combines model-affinity filtering (a soft
//! preference), cooldown exclusion with an oldest-entry eviction escape
//! valve, and a weighted random draw. Credentials are decrypted here,
//! immediately before use, and never leave the request path.

mod cooldown;
mod selection;

pub use cooldown::{CooldownTable, DEFAULT_COOLDOWN};
pub use selection::{RandomSource, ThreadRngSource, weighted_pick};

use crate::core::types::{ProviderFamily, ProviderHealth, ProviderRecord};
use crate::storage::ProviderStore;
use crate::utils::crypto;
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Error count at which a provider reads as degraded (still selectable).
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

/// Selects a provider for each upstream attempt and applies health
/// transitions on the attempt's outcome.
pub struct ProviderRouter {
    store: Arc<dyn ProviderStore>,
    cooldowns: Arc<CooldownTable>,
    rng: Arc<dyn RandomSource>,
    master_key: Vec<u8>,
    error_threshold: u32,
}

impl ProviderRouter {
    pub fn new(
        store: Arc<dyn ProviderStore>,
        cooldowns: Arc<CooldownTable>,
        master_key: Vec<u8>,
    ) -> Self {
        Self {
            store,
            cooldowns,
            rng: Arc::new(ThreadRngSource),
            master_key,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    /// Replace the randomness source (deterministic selection in tests).
    pub fn with_random_source(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// Select a provider for one upstream attempt and decrypt its credential.
    ///
    /// Model affinity is soft: when narrowing by the preferred model leaves
    /// nothing, the unfiltered family pool is used instead. If cooldown
    /// filtering empties the pool, the single oldest cooldown entry is
    /// evicted process-wide and the pre-eviction pool is drawn from, so a
    /// fully cooling family still makes forward progress.
    pub async fn pick(
        &self,
        tenant_id: Uuid,
        family: ProviderFamily,
        preferred_model: Option<&str>,
    ) -> Result<(ProviderRecord, String)> {
        let providers = self.store.list_active(tenant_id, family).await?;
        if providers.is_empty() {
            return Err(GatewayError::NoActiveProvider {
                tenant: tenant_id,
                family,
            });
        }

        let pool = match preferred_model {
            Some(model) => {
                let narrowed: Vec<ProviderRecord> = providers
                    .iter()
                    .filter(|p| p.serves_model(model))
                    .cloned()
                    .collect();
                if narrowed.is_empty() { providers } else { narrowed }
            }
            None => providers,
        };

        let available: Vec<ProviderRecord> = pool
            .iter()
            .filter(|p| !self.cooldowns.is_cooling(p.id))
            .cloned()
            .collect();

        let candidates = if available.is_empty() {
            if let Some(evicted) = self.cooldowns.evict_oldest() {
                debug!(provider_id = %evicted, "all candidates cooling; evicted oldest cooldown entry");
            }
            pool
        } else {
            available
        };

        let chosen = weighted_pick(&candidates, self.rng.as_ref()).clone();

        let api_key = crypto::decrypt_credential(&self.master_key, &chosen.api_key_encrypted)
            .map_err(|err| {
                warn!(provider_id = %chosen.id, error = %err, "credential decryption failed");
                GatewayError::DecryptionFailed(chosen.id)
            })?;

        debug!(
            provider_id = %chosen.id,
            provider = %chosen.name,
            weight = chosen.weight,
            "selected provider"
        );
        Ok((chosen, api_key))
    }

    /// Record a proxy failure: persist the error increment and start a
    /// cooldown for the provider.
    pub async fn mark_error(&self, provider_id: Uuid) -> Result<()> {
        self.store.record_error(provider_id, Utc::now()).await?;
        self.cooldowns.place(provider_id);
        Ok(())
    }

    /// Record a proxy success: persist the counter reset and clear any
    /// cooldown entry for the provider.
    pub async fn mark_success(&self, provider_id: Uuid) -> Result<()> {
        self.store.record_success(provider_id, Utc::now()).await?;
        self.cooldowns.clear(provider_id);
        Ok(())
    }

    /// Derived health for a provider: cooling means down; otherwise the
    /// persisted error counter decides healthy vs. degraded.
    pub fn health(&self, provider: &ProviderRecord) -> ProviderHealth {
        if self.cooldowns.is_cooling(provider.id) {
            ProviderHealth::Down
        } else if provider.error_count >= self.error_threshold {
            ProviderHealth::Degraded
        } else {
            ProviderHealth::Healthy
        }
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }
}
