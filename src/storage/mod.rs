//! Provider directory boundary
//!
//! The gateway core persists nothing itself; it consumes this narrow
//! repository surface. Durable provider CRUD and usage-log storage live in
//! the surrounding platform. [`MemoryProviderStore`] backs the standalone
//! binary and the test suite.

use crate::core::types::{ProviderFamily, ProviderRecord, UsageRecord};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

/// The five persistence operations the gateway core requires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Active providers for a tenant, filtered to one family.
    async fn list_active(
        &self,
        tenant_id: Uuid,
        family: ProviderFamily,
    ) -> Result<Vec<ProviderRecord>>;

    async fn get(&self, provider_id: Uuid) -> Result<Option<ProviderRecord>>;

    /// Increment the provider's rolling error counter and stamp the
    /// failure time.
    async fn record_error(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Reset the error counter and refresh the last-used timestamp.
    async fn record_success(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn insert_usage(&self, record: UsageRecord) -> Result<()>;
}

/// In-memory provider directory.
#[derive(Default)]
pub struct MemoryProviderStore {
    providers: DashMap<Uuid, ProviderRecord>,
    usage: Mutex<Vec<UsageRecord>>,
}

impl MemoryProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_provider(&self, provider: ProviderRecord) {
        self.providers.insert(provider.id, provider);
    }

    pub fn remove_provider(&self, provider_id: Uuid) {
        self.providers.remove(&provider_id);
    }

    /// Snapshot of recorded usage, oldest first.
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.lock().clone()
    }
}

#[async_trait]
impl ProviderStore for MemoryProviderStore {
    async fn list_active(
        &self,
        tenant_id: Uuid,
        family: ProviderFamily,
    ) -> Result<Vec<ProviderRecord>> {
        let mut providers: Vec<ProviderRecord> = self
            .providers
            .iter()
            .filter(|entry| {
                let p = entry.value();
                p.tenant_id == tenant_id && p.family == family && p.active
            })
            .map(|entry| entry.value().clone())
            .collect();
        // Stable listing order regardless of map internals.
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(providers)
    }

    async fn get(&self, provider_id: Uuid) -> Result<Option<ProviderRecord>> {
        Ok(self.providers.get(&provider_id).map(|e| e.value().clone()))
    }

    async fn record_error(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut entry) = self.providers.get_mut(&provider_id) {
            entry.error_count += 1;
            entry.last_error_at = Some(at);
        }
        Ok(())
    }

    async fn record_success(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut entry) = self.providers.get_mut(&provider_id) {
            entry.error_count = 0;
            entry.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn insert_usage(&self, record: UsageRecord) -> Result<()> {
        self.usage.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(tenant: Uuid, name: &str, family: ProviderFamily, active: bool) -> ProviderRecord {
        ProviderRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            name: name.into(),
            family,
            base_url: "https://upstream.example".into(),
            api_key_encrypted: String::new(),
            models: vec![],
            weight: 1,
            active,
            error_count: 0,
            last_error_at: None,
            last_used_at: None,
            max_rpm: None,
        }
    }

    #[tokio::test]
    async fn test_list_active_filters_and_sorts() {
        let tenant = Uuid::new_v4();
        let store = MemoryProviderStore::new();
        store.insert_provider(provider(tenant, "b", ProviderFamily::OpenAi, true));
        store.insert_provider(provider(tenant, "a", ProviderFamily::OpenAi, true));
        store.insert_provider(provider(tenant, "c", ProviderFamily::OpenAi, false));
        store.insert_provider(provider(tenant, "d", ProviderFamily::Anthropic, true));
        store.insert_provider(provider(Uuid::new_v4(), "e", ProviderFamily::OpenAi, true));

        let listed = store.list_active(tenant, ProviderFamily::OpenAi).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_error_and_success_bookkeeping() {
        let tenant = Uuid::new_v4();
        let store = MemoryProviderStore::new();
        let p = provider(tenant, "a", ProviderFamily::OpenAi, true);
        let id = p.id;
        store.insert_provider(p);

        store.record_error(id, Utc::now()).await.unwrap();
        store.record_error(id, Utc::now()).await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.error_count, 2);
        assert!(record.last_error_at.is_some());
        assert!(record.last_used_at.is_none());

        store.record_success(id, Utc::now()).await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.error_count, 0);
        assert!(record.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_bookkeeping_on_unknown_provider_is_a_no_op() {
        let store = MemoryProviderStore::new();
        assert!(store.record_error(Uuid::new_v4(), Utc::now()).await.is_ok());
        assert!(store.record_success(Uuid::new_v4(), Utc::now()).await.is_ok());
    }
}
