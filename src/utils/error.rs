//! Error types for the gateway

use crate::core::types::ProviderFamily;
use crate::utils::crypto::CryptoError;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway.
///
/// Selection failures (`NoActiveProvider`, `DecryptionFailed`) are kept
/// distinct from upstream failures so the proxy retry loop can tell what is
/// worth another attempt: transport errors, 5xx, and 429 rotate providers;
/// everything else is terminal.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential codec errors
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// No usable provider exists for the tenant/family at all.
    #[error("no active {family} provider configured for tenant {tenant}")]
    NoActiveProvider {
        tenant: Uuid,
        family: ProviderFamily,
    },

    /// The selected provider's stored credential could not be decrypted.
    /// Fatal for this pick only; a re-pick may draw a different provider.
    #[error("credential decryption failed for provider {0}")]
    DecryptionFailed(Uuid),

    /// Connect/timeout-level upstream failure. Retryable.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// Upstream returned a 5xx. Retryable.
    #[error("upstream server error: HTTP {0}")]
    UpstreamServerError(u16),

    /// Upstream returned 429. Retryable.
    #[error("upstream rate limited (HTTP 429)")]
    UpstreamRateLimited,

    /// The retry ceiling was reached without an acceptable attempt.
    #[error("all {attempts} upstream attempts failed; last error: {last}")]
    UpstreamExhausted { attempts: u32, last: String },

    /// The master key is not configured; no gateway traffic is possible.
    #[error("gateway disabled: master key is not configured")]
    GatewayDisabled,

    /// Provider directory errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad request errors
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the proxy retry loop should rotate providers and try again.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamTransport(_)
                | GatewayError::UpstreamServerError(_)
                | GatewayError::UpstreamRateLimited
        )
    }
}
