//! Upstream request construction: URL join, header filtering, and
//! credential injection.
//!
//! This is the credential-isolation boundary: caller-supplied authorization
//! material is always dropped and replaced with the gateway-held key for
//! the selected provider.

use crate::core::types::ProviderFamily;
use crate::utils::error::{GatewayError, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

/// API version injected for Anthropic-style upstreams when the caller does
/// not pin one.
const ANTHROPIC_VERSION_DEFAULT: &str = "2023-06-01";

/// Headers never forwarded in either direction: hop-by-hop framing plus
/// caller credential material.
const STRIPPED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "authorization",
    "x-api-key",
    "proxy-authorization",
];

pub fn is_stripped(name: &str) -> bool {
    STRIPPED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Join a provider base URL and the request tail (path plus query).
pub fn upstream_url(base_url: &str, tail: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        tail.trim_start_matches('/')
    )
}

/// Copy forwardable client headers and inject the family credential.
pub fn build_headers(
    client_headers: &HeaderMap,
    family: ProviderFamily,
    api_key: &str,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in client_headers {
        if !is_stripped(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    match family {
        ProviderFamily::OpenAi => {
            let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| GatewayError::Internal("credential is not header-safe".into()))?;
            headers.insert(AUTHORIZATION, bearer);
        }
        ProviderFamily::Anthropic => {
            let key = HeaderValue::from_str(api_key)
                .map_err(|_| GatewayError::Internal("credential is not header-safe".into()))?;
            headers.insert(HeaderName::from_static("x-api-key"), key);

            let version = HeaderName::from_static("anthropic-version");
            if !headers.contains_key(&version) {
                headers.insert(version, HeaderValue::from_static(ANTHROPIC_VERSION_DEFAULT));
            }
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_url_joining() {
        assert_eq!(
            upstream_url("https://api.openai.com", "v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            upstream_url("https://api.openai.com/", "/v1/models?limit=5"),
            "https://api.openai.com/v1/models?limit=5"
        );
    }

    #[test]
    fn test_hop_by_hop_and_credentials_are_stripped() {
        assert!(is_stripped("Host"));
        assert!(is_stripped("CONNECTION"));
        assert!(is_stripped("keep-alive"));
        assert!(is_stripped("Transfer-Encoding"));
        assert!(is_stripped("Authorization"));
        assert!(is_stripped("x-api-key"));
        assert!(!is_stripped("Content-Type"));
        assert!(!is_stripped("anthropic-version"));
    }

    #[test]
    fn test_caller_authorization_never_passes_through() {
        let mut client = HeaderMap::new();
        client.insert(AUTHORIZATION, HeaderValue::from_static("Bearer caller-token"));
        client.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static("caller-key"),
        );
        client.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );

        let headers = build_headers(&client, ProviderFamily::OpenAi, "sk-gw").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-gw");
        assert!(headers.get("x-api-key").is_none());
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_anthropic_injection_with_version_default() {
        let headers = build_headers(&HeaderMap::new(), ProviderFamily::Anthropic, "sk-ant").unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant");
        assert_eq!(
            headers.get("anthropic-version").unwrap(),
            ANTHROPIC_VERSION_DEFAULT
        );
    }

    #[test]
    fn test_caller_pinned_anthropic_version_is_kept() {
        let mut client = HeaderMap::new();
        client.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static("2024-10-22"),
        );
        let headers = build_headers(&client, ProviderFamily::Anthropic, "sk-ant").unwrap();
        assert_eq!(headers.get("anthropic-version").unwrap(), "2024-10-22");
    }

    #[test]
    fn test_unsafe_credential_is_rejected() {
        let result = build_headers(&HeaderMap::new(), ProviderFamily::Anthropic, "bad\nkey");
        assert!(result.is_err());
    }
}
