//! Authenticated Encryption with Associated Data
//!
//! Uses XChaCha20-Poly1305 (192-bit nonce).
//! Key size: 32 bytes.  Nonce: 24 bytes (random).  Tag: 16 bytes.
//!
//! Two forms:
//! - Detached nonce (`encrypt`/`decrypt`): the backend stores ciphertext
//!   and nonce as separate record fields, so they travel separately.
//! - Combined (`encrypt_combined`/`decrypt_combined`): `[nonce | ct+tag]`
//!   with AAD, used for vault values at rest.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::{error::CryptoError, NONCE_LEN};

/// Fresh random 24-byte nonce from the OS RNG. Called once per encryption;
/// never derived from a counter.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` with a 32-byte room key. Generates a fresh random
/// nonce on every call and returns it alongside the ciphertext.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = generate_nonce();
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::AeadEncrypt)?;
    Ok((ciphertext, nonce))
}

/// Decrypt a detached-nonce ciphertext. Fails on any tag mismatch; never
/// returns unauthenticated output.
pub fn decrypt(
    key: &[u8; 32],
    ciphertext: &[u8],
    nonce: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonce(nonce.len()));
    }
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt with the nonce prepended: `[nonce (24) | ciphertext + tag]`.
/// `aad` is authenticated but not encrypted.
pub fn encrypt_combined(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = generate_nonce();
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            chacha20poly1305::aead::Payload { msg: plaintext, aad },
        )
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt combined-format bytes (nonce || ciphertext+tag).
pub fn decrypt_combined(
    key: &[u8; 32],
    data: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce_bytes),
            chacha20poly1305::aead::Payload { msg: ct, aad },
        )
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}
