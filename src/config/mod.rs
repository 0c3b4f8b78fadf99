//! Gateway configuration: YAML file plus environment overrides.
//!
//! The master key is only ever read from `GATEWAY_MASTER_KEY`, never from
//! the config file. Its absence is not an error: the gateway boots in a
//! disabled state and reports it, instead of crashing or serving traffic
//! it cannot decrypt credentials for.

use crate::core::types::ProviderFamily;
use crate::utils::crypto::MASTER_KEY_LEN;
use crate::utils::error::{GatewayError, Result};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Fixed retry ceiling per client-facing request.
    pub max_attempts: u32,
    /// Per-attempt upstream timeout in seconds.
    pub upstream_timeout_secs: u64,
    /// Cooldown window after a proxy failure, in seconds.
    pub cooldown_secs: u64,
    /// Error count at which a provider reads as degraded.
    pub error_threshold: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            upstream_timeout_secs: 300,
            cooldown_secs: 60,
            error_threshold: 5,
        }
    }
}

impl ProxyConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Provider seeded into the in-memory directory at startup. The plaintext
/// `api_key` is encrypted with the master key before it reaches the store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSeed {
    pub name: String,
    pub tenant_id: Uuid,
    pub family: ProviderFamily,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub max_rpm: Option<u32>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub providers: Vec<ProviderSeed>,
    /// Populated from `GATEWAY_MASTER_KEY`; never serialized.
    #[serde(skip)]
    pub master_key: Option<Vec<u8>>,
}

impl GatewayConfig {
    /// Load from the YAML file (when present) and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = env::var("GATEWAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            debug!(path = %path, "no config file found; using defaults");
            Self::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("GATEWAY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| GatewayError::Config(format!("invalid GATEWAY_PORT: {e}")))?;
        }
        if let Ok(timeout) = env::var("GATEWAY_UPSTREAM_TIMEOUT_SECS") {
            self.proxy.upstream_timeout_secs = timeout.parse().map_err(|e| {
                GatewayError::Config(format!("invalid GATEWAY_UPSTREAM_TIMEOUT_SECS: {e}"))
            })?;
        }
        if let Ok(cooldown) = env::var("GATEWAY_COOLDOWN_SECS") {
            self.proxy.cooldown_secs = cooldown
                .parse()
                .map_err(|e| GatewayError::Config(format!("invalid GATEWAY_COOLDOWN_SECS: {e}")))?;
        }
        self.master_key = match env::var("GATEWAY_MASTER_KEY") {
            Ok(raw) if !raw.is_empty() => Some(parse_master_key(&raw)?),
            _ => None,
        };
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.proxy.max_attempts == 0 {
            return Err(GatewayError::Config(
                "proxy.max_attempts must be at least 1".into(),
            ));
        }
        for seed in &self.providers {
            Url::parse(&seed.base_url).map_err(|e| {
                GatewayError::Config(format!("provider {}: invalid base_url: {e}", seed.name))
            })?;
        }
        Ok(())
    }
}

/// Parse the master key material: base64 or hex of exactly 32 bytes.
/// Both encodings are tried; whichever yields 32 bytes wins.
pub fn parse_master_key(raw: &str) -> Result<Vec<u8>> {
    if let Ok(decoded) = general_purpose::STANDARD.decode(raw.as_bytes()) {
        if decoded.len() == MASTER_KEY_LEN {
            return Ok(decoded);
        }
    }
    if let Ok(decoded) = hex::decode(raw.as_bytes()) {
        if decoded.len() == MASTER_KEY_LEN {
            return Ok(decoded);
        }
    }
    Err(GatewayError::Config(format!(
        "GATEWAY_MASTER_KEY must be base64 or hex encoding exactly {MASTER_KEY_LEN} bytes"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.proxy.max_attempts, 3);
        assert_eq!(config.proxy.cooldown(), Duration::from_secs(60));
        assert_eq!(config.proxy.upstream_timeout(), Duration::from_secs(300));
        assert!(config.providers.is_empty());
        assert!(config.master_key.is_none());
    }

    #[test]
    fn test_from_file() {
        let yaml = r#"
server:
  host: 127.0.0.1
  port: 9090
proxy:
  cooldown_secs: 120
providers:
  - name: primary-openai
    tenant_id: 6e9eb01c-14c5-4e3c-a5f6-3a8f7f6f2b4e
    family: openai
    base_url: https://api.openai.com
    api_key: sk-test
    models: [gpt-4o]
    weight: 3
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = GatewayConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.proxy.cooldown_secs, 120);
        // Unset sections keep their defaults.
        assert_eq!(config.proxy.max_attempts, 3);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].family, ProviderFamily::OpenAi);
        assert_eq!(config.providers[0].weight, 3);
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = GatewayConfig::default();
        config.providers.push(ProviderSeed {
            name: "broken".into(),
            tenant_id: Uuid::new_v4(),
            family: ProviderFamily::Anthropic,
            base_url: "not a url".into(),
            api_key: "sk".into(),
            models: vec![],
            weight: 1,
            max_rpm: None,
        });
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = GatewayConfig::default();
        config.proxy.max_attempts = 0;
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_parse_master_key_base64_and_hex() {
        let key = [5u8; MASTER_KEY_LEN];
        let b64 = general_purpose::STANDARD.encode(key);
        assert_eq!(parse_master_key(&b64).unwrap(), key.to_vec());

        let hexed = hex::encode(key);
        assert_eq!(parse_master_key(&hexed).unwrap(), key.to_vec());
    }

    #[test]
    fn test_parse_master_key_rejects_wrong_length() {
        let short = general_purpose::STANDARD.encode([1u8; 16]);
        assert!(matches!(
            parse_master_key(&short),
            Err(GatewayError::Config(_))
        ));
        assert!(matches!(
            parse_master_key("!!not-key-material!!"),
            Err(GatewayError::Config(_))
        ));
    }
}
