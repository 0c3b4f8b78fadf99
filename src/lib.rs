//! # llm-gateway
//!
//! Tenant-aware LLM gateway: accepts upstream-shaped chat/completion
//! requests, selects a healthy provider for the tenant, forwards the
//! request with the gateway-held credential injected, and produces a
//! per-request token/cost accounting record.
//!
//! ## Features
//!
//! - **Weighted routing**: proportional random selection across a tenant's
//!   configured providers, with soft model affinity
//! - **Cooldown failover**: failed providers are excluded for a fixed
//!   window, with an oldest-entry eviction escape valve for liveness
//! - **Streaming passthrough**: event-stream responses are relayed
//!   byte-for-byte while usage counts are extracted inline
//! - **Credential isolation**: provider keys are AES-256-GCM encrypted at
//!   rest and caller authorization material never reaches an upstream
//! - **Microcurrency billing**: integer cost accounting at 10^-6 USD
//!   granularity across both supported upstream schemas
//!
//! ## Gateway mode
//!
//! ```rust,no_run
//! use llm_gateway::config::GatewayConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::load()?;
//!     llm_gateway::server::run(config).await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;

// Re-export main types
pub use config::GatewayConfig;
pub use core::proxy::{ForwardRequest, ProxyBody, ProxyOutcome, ProxyService, ProxySettings};
pub use core::router::{CooldownTable, ProviderRouter, RandomSource};
pub use core::types::{
    ProviderFamily, ProviderHealth, ProviderRecord, TokenUsage, UsageRecord, UsageStatus,
};
pub use storage::{MemoryProviderStore, ProviderStore};
pub use utils::error::{GatewayError, Result};
