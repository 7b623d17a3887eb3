//! CSRF state issuance for OAuth flows. Tokens are random, short-lived, and
//! consumed exactly once (the store's guarded UPDATE enforces single use).

use aes_gcm::aead::OsRng;
use rand::RngCore;

/// How long an issued state token stays valid.
pub const STATE_TTL_MINUTES: i64 = 10;

/// 32 random bytes, hex encoded. Unguessable, compared only by primary-key
/// lookup in the store.
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_hex() {
        let a = generate_state_token();
        let b = generate_state_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
