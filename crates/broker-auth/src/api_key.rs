//! API key plaintext generation and hashing. The plaintext is `es_` followed
//! by 32 bytes of randomness, URL-base64 encoded without padding; only the
//! SHA-256 hash of it is ever persisted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const API_KEY_PREFIX: &str = "es_";

/// Generates a new plaintext API key. Returned once; callers must hash it
/// with [`hash_api_key`] before persisting anything.
pub fn generate_plaintext() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{API_KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub fn hash_api_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_has_expected_prefix() {
        let key = generate_plaintext();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert!(key.len() > API_KEY_PREFIX.len() + 32);
    }

    #[test]
    fn hash_is_deterministic() {
        let key = generate_plaintext();
        assert_eq!(hash_api_key(&key), hash_api_key(&key));
    }

    #[test]
    fn distinct_keys_hash_differently() {
        assert_ne!(hash_api_key(&generate_plaintext()), hash_api_key(&generate_plaintext()));
    }
}
