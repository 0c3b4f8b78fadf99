//! Shared gateway domain types: provider records, token usage, and the
//! per-request usage record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminant between the two incompatible upstream schemas the gateway
/// speaks. Auth injection and usage parsing are both selected by this value;
/// supporting a new schema means adding a variant, not branching ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// OpenAI-style chat completions: bearer auth, `prompt_tokens` /
    /// `completion_tokens` usage with an optional cached-tokens detail.
    OpenAi,
    /// Anthropic-style messages: `x-api-key` auth plus version header,
    /// `input_tokens` / `output_tokens` usage with cache read/write counts.
    Anthropic,
}

impl ProviderFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAi => "openai",
            ProviderFamily::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured upstream model endpoint owned by one tenant.
///
/// Created and edited by tenant administration outside this crate; the
/// gateway core only reads these and mutates them through the two narrow
/// directory operations (error increment, mark used).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub family: ProviderFamily,
    pub base_url: String,
    /// Credential blob produced by the codec; never exposed in plaintext.
    pub api_key_encrypted: String,
    /// Model names this endpoint serves; used for soft model affinity.
    pub models: Vec<String>,
    /// Weight for proportional selection. Zero never wins a weighted draw
    /// unless this is the only candidate left.
    pub weight: u32,
    pub active: bool,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Advisory requests-per-minute hint. Not enforced.
    #[serde(default)]
    pub max_rpm: Option<u32>,
}

impl ProviderRecord {
    pub fn serves_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// Token counts extracted from an upstream response.
///
/// `cache_write_tokens` / `cache_read_tokens` belong to the Anthropic
/// schema; `cached_prompt_tokens` belongs to the OpenAI schema. Fields of
/// the other family stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
    pub cached_prompt_tokens: u64,
}

impl TokenUsage {
    /// Fold a later usage frame into this one. Positive counts refine what
    /// was seen before; a zero or absent field never overwrites a
    /// previously seen positive value.
    pub fn merge_from(&mut self, other: &TokenUsage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
        if other.cache_write_tokens > 0 {
            self.cache_write_tokens = other.cache_write_tokens;
        }
        if other.cache_read_tokens > 0 {
            self.cache_read_tokens = other.cache_read_tokens;
        }
        if other.cached_prompt_tokens > 0 {
            self.cached_prompt_tokens = other.cached_prompt_tokens;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TokenUsage::default()
    }
}

/// Final outcome of one client-facing gateway request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    Failed,
}

/// Accounting artifact written exactly once per client-facing request,
/// after the retry loop terminates (success or exhaustion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// None when selection itself failed and no provider was ever picked.
    pub provider_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    /// Model name read from the request body, when present.
    pub model: Option<String>,
    pub usage: TokenUsage,
    /// Cost in micro-USD (10^-6 USD). Integer to avoid floating-point
    /// drift on tiny per-token amounts.
    pub cost_micro_usd: u64,
    pub status: UsageStatus,
    pub latency_ms: u64,
    /// Retries actually consumed: 0 when the first attempt settled it.
    pub retry_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Derived provider health. Never stored; computed from cooldown membership
/// and the persisted error counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    /// Not cooling down, error counter below threshold.
    Healthy,
    /// Not cooling down, error counter at or above threshold. Still
    /// selectable.
    Degraded,
    /// Currently cooling down; excluded from selection until expiry or
    /// eviction.
    Down,
}
