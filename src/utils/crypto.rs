//! Credential encryption at rest using AES-256-GCM
//!
//! Provider API keys are stored as `base64(nonce || ciphertext || tag)` and
//! only ever decrypted inside the router, immediately before an upstream
//! call. The master key must be exactly 32 bytes; this is checked before any
//! cryptographic operation.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use thiserror::Error;

/// Required master key length in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// AES-GCM nonce size (96 bits / 12 bytes as recommended by NIST).
const NONCE_LEN: usize = 12;

/// GCM authentication tag size appended to the ciphertext.
const TAG_LEN: usize = 16;

/// Failures of the credential codec. Decryption fails closed: no plaintext
/// is ever returned on a bad key, short blob, or failed authentication.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The master key is not exactly [`MASTER_KEY_LEN`] bytes.
    #[error("master key must be {MASTER_KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The stored blob is not valid base64.
    #[error("encrypted blob is not valid base64")]
    InvalidEncoding,

    /// The decoded blob is shorter than one nonce plus one tag.
    #[error("encrypted blob is truncated")]
    Truncated,

    /// The authentication tag did not verify: wrong key or tampered data.
    #[error("authentication failed: wrong key or tampered data")]
    AuthenticationFailed,

    /// The decrypted credential is not valid UTF-8.
    #[error("decrypted credential is not valid UTF-8")]
    Utf8,

    /// Cipher-level failure during encryption.
    #[error("cipher failure")]
    Cipher,
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != MASTER_KEY_LEN {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
}

/// Encrypt a plaintext credential for storage.
///
/// Output format: `base64(nonce || ciphertext || tag)` with a fresh random
/// 12-byte nonce per call.
pub fn encrypt_credential(key: &[u8], plaintext: &str) -> Result<String, CryptoError> {
    let cipher = cipher_for(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::Cipher)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(general_purpose::STANDARD.encode(blob))
}

/// Decrypt a credential blob produced by [`encrypt_credential`].
///
/// Verifies the authentication tag before returning plaintext.
pub fn decrypt_credential(key: &[u8], blob: &str) -> Result<String, CryptoError> {
    let cipher = cipher_for(key)?;

    let raw = general_purpose::STANDARD
        .decode(blob)
        .map_err(|_| CryptoError::InvalidEncoding)?;
    if raw.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Truncated);
    }

    let nonce = Nonce::from_slice(&raw[..NONCE_LEN]);
    let plaintext = cipher
        .decrypt(nonce, &raw[NONCE_LEN..])
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
}

/// Display-safe prefix of a secret for UI and logs: the first 10 characters
/// plus an ellipsis, or the whole string when it is 10 characters or fewer.
pub fn display_prefix(secret: &str) -> String {
    if secret.chars().count() <= 10 {
        secret.to_string()
    } else {
        let head: String = secret.chars().take(10).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; MASTER_KEY_LEN] = [42u8; MASTER_KEY_LEN];

    #[test]
    fn test_round_trip() {
        let blob = encrypt_credential(&KEY, "sk-live-very-secret").unwrap();
        let plain = decrypt_credential(&KEY, &blob).unwrap();
        assert_eq!(plain, "sk-live-very-secret");
    }

    #[test]
    fn test_round_trip_empty_and_unicode() {
        for secret in ["", "pässwörd-日本語-🔑"] {
            let blob = encrypt_credential(&KEY, secret).unwrap();
            assert_eq!(decrypt_credential(&KEY, &blob).unwrap(), secret);
        }
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let a = encrypt_credential(&KEY, "same-input").unwrap();
        let b = encrypt_credential(&KEY, "same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_key_length_rejected_before_any_work() {
        let short = [0u8; 16];
        assert!(matches!(
            encrypt_credential(&short, "x"),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(matches!(
            decrypt_credential(&short, "aaaa"),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let blob = encrypt_credential(&KEY, "secret").unwrap();
        let other = [7u8; MASTER_KEY_LEN];
        assert!(matches!(
            decrypt_credential(&other, &blob),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let blob = encrypt_credential(&KEY, "secret").unwrap();
        let mut raw = general_purpose::STANDARD.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = general_purpose::STANDARD.encode(raw);
        assert!(matches!(
            decrypt_credential(&KEY, &tampered),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_truncated_blob_fails_closed() {
        let short = general_purpose::STANDARD.encode([0u8; NONCE_LEN]);
        assert!(matches!(
            decrypt_credential(&KEY, &short),
            Err(CryptoError::Truncated)
        ));
    }

    #[test]
    fn test_garbage_encoding_rejected() {
        assert!(matches!(
            decrypt_credential(&KEY, "%%% not base64 %%%"),
            Err(CryptoError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_display_prefix() {
        assert_eq!(display_prefix("sk-live-abcdef123456"), "sk-live-ab...");
        assert_eq!(display_prefix("short"), "short");
        assert_eq!(display_prefix("exactly10!"), "exactly10!");
    }
}
