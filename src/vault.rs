//! Credential vault: AES-256-GCM with a fresh random nonce per call.
//!
//! The blob format is `base64(nonce || ciphertext)`. Encrypting the same
//! plaintext twice yields different blobs, so equality probing against the
//! stored column is useless. Decryption fails hard on any malformed or
//! tampered blob; it never returns partial plaintext.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed blob, authentication tag mismatch, or wrong key.
    #[error("decryption failed")]
    Decryption,

    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Process-wide symmetric cipher. The key is loaded once at startup from
/// configuration; a missing or malformed key is a startup failure, never a
/// per-call one.
pub struct VaultCrypto {
    key: [u8; 32],
}

impl VaultCrypto {
    pub fn new(master_key_hex: &str) -> anyhow::Result<Self> {
        let key = parse_master_key(master_key_hex)?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| VaultError::Encryption(format!("invalid key length: {e:?}")))?;

        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let bytes = BASE64.decode(blob).map_err(|_| VaultError::Decryption)?;
        if bytes.len() <= NONCE_LEN {
            return Err(VaultError::Decryption);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);

        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| VaultError::Decryption)?;
        let nonce = Nonce::from_slice(nonce_bytes);
        let mut plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::Decryption)?;

        match String::from_utf8(std::mem::take(&mut plaintext)) {
            Ok(s) => Ok(s),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(VaultError::Decryption)
            }
        }
    }
}

impl Drop for VaultCrypto {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn parse_master_key(hex_key: &str) -> anyhow::Result<[u8; 32]> {
    if hex_key.len() != 64 {
        anyhow::bail!(
            "SETLOG_MASTER_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex_key.len()
        );
    }
    let bytes = hex::decode(hex_key)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn roundtrip() {
        let vault = VaultCrypto::new(TEST_KEY).unwrap();
        let secret = "sk_live_123456789";
        let blob = vault.encrypt(secret).unwrap();
        assert_eq!(vault.decrypt(&blob).unwrap(), secret);
    }

    #[test]
    fn same_plaintext_different_blobs() {
        let vault = VaultCrypto::new(TEST_KEY).unwrap();
        let a = vault.encrypt("DATABASE_URL=postgres://x").unwrap();
        let b = vault.encrypt("DATABASE_URL=postgres://x").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), vault.decrypt(&b).unwrap());
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let vault = VaultCrypto::new(TEST_KEY).unwrap();
        let blob = vault.encrypt("super-secret").unwrap();

        let mut raw = BASE64.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);

        assert!(matches!(
            vault.decrypt(&tampered),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let vault = VaultCrypto::new(TEST_KEY).unwrap();
        let other = VaultCrypto::new(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .unwrap();
        let blob = vault.encrypt("super-secret").unwrap();
        assert!(matches!(other.decrypt(&blob), Err(VaultError::Decryption)));
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        let vault = VaultCrypto::new(TEST_KEY).unwrap();
        for blob in ["", "not base64 !!!", "AAAA", &BASE64.encode([0u8; 11])] {
            assert!(matches!(vault.decrypt(blob), Err(VaultError::Decryption)));
        }
    }

    #[test]
    fn key_must_be_64_hex_chars() {
        assert!(VaultCrypto::new("deadbeef").is_err());
        assert!(VaultCrypto::new(&"zz".repeat(32)).is_err());
    }
}
