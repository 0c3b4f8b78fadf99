//! Provider cooldown tracking
//!
//! A lightweight circuit breaker: a provider that failed a proxy attempt is
//! excluded from selection until its entry expires or is evicted. The table
//! is process-wide, in-memory, and intentionally transient; a freshly
//! started gateway treats every provider as healthy until proven otherwise.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default exclusion window after a proxy failure.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Map of provider id to cooldown expiry.
///
/// Owned by the router and injected as a collaborator so the backing table
/// could be swapped for a shared store without touching selection logic.
/// Reads take the shared lock; writes and eviction take the exclusive lock.
pub struct CooldownTable {
    window: Duration,
    entries: RwLock<HashMap<Uuid, Instant>>,
}

impl CooldownTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Start (or refresh) a cooldown for the provider.
    /// Expired entries are dropped opportunistically on this write path.
    pub fn place(&self, provider_id: Uuid) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, expiry| *expiry > now);
        entries.insert(provider_id, now + self.window);
    }

    /// Remove the provider's entry, if any.
    pub fn clear(&self, provider_id: Uuid) {
        self.entries.write().remove(&provider_id);
    }

    /// True when a live (non-expired) entry exists for the provider.
    pub fn is_cooling(&self, provider_id: Uuid) -> bool {
        self.entries
            .read()
            .get(&provider_id)
            .map(|expiry| *expiry > Instant::now())
            .unwrap_or(false)
    }

    /// Evict the single entry closest to expiry, process-wide.
    ///
    /// This is the escape valve that keeps a fully cooling pool from being
    /// permanently empty. Returns the evicted provider id.
    pub fn evict_oldest(&self) -> Option<Uuid> {
        let mut entries = self.entries.write();
        let oldest = entries
            .iter()
            .min_by_key(|(_, expiry)| **expiry)
            .map(|(id, _)| *id)?;
        entries.remove(&oldest);
        Some(oldest)
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for CooldownTable {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
