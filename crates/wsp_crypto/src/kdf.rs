//! Key derivation functions
//!
//! `vault_key_from_password` — Argon2id, derives the 32-byte master key
//!   that encrypts KeyVault values at rest.
//!
//! `hkdf_expand` — HKDF-SHA256, used by the sealed-box construction.

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Vault key (Argon2id) ─────────────────────────────────────────────────────

/// 32-byte vault master key derived from a user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

/// Argon2id parameters tuned for interactive use.
fn argon2_params() -> Params {
    Params::new(
        64 * 1024, // m_cost: 64 MiB
        3,         // t_cost: 3 iterations
        1,         // p_cost: 1 thread
        Some(32),  // output len
    )
    .expect("Static Argon2 params are always valid")
}

/// Derive a vault key from a user password + 16-byte salt.
/// The salt is stored alongside the vault (not secret).
pub fn vault_key_from_password(password: &[u8], salt: &[u8; 16]) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params());
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Generate a fresh random 16-byte salt (call once on first run; store it).
pub fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a fresh random 32-byte room key.
pub fn generate_room_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

// ── HKDF-SHA256 ──────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
/// `salt` may be None (HKDF uses a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_key_is_deterministic_per_salt() {
        let salt = [7u8; 16];
        let a = vault_key_from_password(b"hunter2", &salt).unwrap();
        let b = vault_key_from_password(b"hunter2", &salt).unwrap();
        assert_eq!(a.0, b.0);

        let other_salt = [8u8; 16];
        let c = vault_key_from_password(b"hunter2", &other_salt).unwrap();
        assert_ne!(a.0, c.0);
    }

    #[test]
    fn hkdf_output_depends_on_info() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        hkdf_expand(b"ikm", None, b"info-a", &mut a).unwrap();
        hkdf_expand(b"ikm", None, b"info-b", &mut b).unwrap();
        assert_ne!(a, b);
    }
}
