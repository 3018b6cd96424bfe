//! Key derivation: one Argon2id profile for everything.
//!
//! The same primitive unlocks the vault (secret = password, salt = vault
//! header salt) and derives per-object content keys (secret = master key,
//! salt = object nonce). Decryption must re-derive rather than store keys,
//! so determinism is a hard requirement — and the cost parameters are fixed
//! and non-negotiable for the same reason.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroize;

use frostbox_core::{FbError, FbResult, KEY_SIZE};
use frostbox_secure::SecureBytes;

/// Argon2id iterations.
const TIME_COST: u32 = 3;
/// Argon2id memory, in KiB (32 MiB).
const MEM_COST_KIB: u32 = 32 * 1024;
/// Argon2id lanes.
const PARALLELISM: u32 = 4;

/// Derive a 32-byte key from `secret` and `salt`.
///
/// Deterministic: identical inputs always produce identical output. The
/// salt must be at least 8 bytes (both call sites use 32).
pub fn derive_key(secret: &[u8], salt: &[u8]) -> FbResult<SecureBytes> {
    let params = Params::new(MEM_COST_KIB, TIME_COST, PARALLELISM, Some(KEY_SIZE))
        .map_err(|e| FbError::Resource(format!("invalid Argon2id params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret, salt, &mut out)
        .map_err(|e| FbError::Resource(format!("Argon2id derivation failed: {e}")))?;

    let key = SecureBytes::from_vec(out.to_vec());
    out.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let salt = [3u8; 32];
        let k1 = derive_key(b"abc12345", &salt).unwrap();
        let k2 = derive_key(b"abc12345", &salt).unwrap();
        assert_eq!(&*k1.expose().unwrap(), &*k2.expose().unwrap());
        assert_eq!(k1.len(), KEY_SIZE);
    }

    #[test]
    fn test_different_salts_different_keys() {
        let k1 = derive_key(b"abc12345", &[1u8; 32]).unwrap();
        let k2 = derive_key(b"abc12345", &[2u8; 32]).unwrap();
        assert_ne!(&*k1.expose().unwrap(), &*k2.expose().unwrap());
    }

    #[test]
    fn test_different_secrets_different_keys() {
        let salt = [9u8; 32];
        let k1 = derive_key(b"password-a", &salt).unwrap();
        let k2 = derive_key(b"password-b", &salt).unwrap();
        assert_ne!(&*k1.expose().unwrap(), &*k2.expose().unwrap());
    }
}
