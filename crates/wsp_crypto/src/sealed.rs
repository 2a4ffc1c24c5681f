//! Anonymous sealed-box key wrapping.
//!
//! Wraps a 32-byte room key for one recipient so that only the holder of
//! the matching X25519 secret can open it. The sender is not authenticated
//! by the envelope; that comes from the transport/session layer.
//!
//! Construction:
//!   EK      = fresh ephemeral X25519 keypair (one per seal() call)
//!   shared  = DH(EK_secret, recipient_pub)
//!   wrap_k  = HKDF-SHA256(shared, salt = "wsp-sealed-v1", info = "seal-key")
//!   nonce   = BLAKE3(EK_pub || recipient_pub)[..24]
//!   wire    = [ EK_pub (32) | XChaCha20-Poly1305(wrap_k, nonce, room_key) ]
//!
//! The nonce is derived, not random: wrap_k is unique per ephemeral key, so
//! (wrap_k, nonce) pairs never repeat.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::{error::CryptoError, kdf, NONCE_LEN, ROOM_KEY_LEN};

const SEAL_SALT: &[u8] = b"wsp-sealed-v1";
const SEAL_INFO: &[u8] = b"seal-key";

fn to_32(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte key".into()))
}

fn seal_nonce(epk: &[u8; 32], recipient_pub: &[u8; 32]) -> [u8; NONCE_LEN] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(epk);
    hasher.update(recipient_pub);
    let digest = hasher.finalize();
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&digest.as_bytes()[..NONCE_LEN]);
    nonce
}

fn derive_wrap_key(shared: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut wrap_k = [0u8; 32];
    kdf::hkdf_expand(shared, Some(SEAL_SALT), SEAL_INFO, &mut wrap_k)?;
    Ok(wrap_k)
}

/// Seal a room key for `recipient_pub`. Anyone can seal; only the matching
/// secret key can open.
pub fn seal(room_key: &[u8; ROOM_KEY_LEN], recipient_pub: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let ek_secret = StaticSecret::random_from_rng(OsRng);
    let ek_pub = X25519Public::from(&ek_secret).to_bytes();

    let shared = ek_secret.diffie_hellman(&X25519Public::from(*recipient_pub));
    let mut wrap_k = derive_wrap_key(shared.as_bytes())?;
    let nonce = seal_nonce(&ek_pub, recipient_pub);

    let cipher = XChaCha20Poly1305::new_from_slice(&wrap_k).map_err(|_| CryptoError::AeadEncrypt)?;
    let ct = cipher
        .encrypt(XNonce::from_slice(&nonce), room_key.as_slice())
        .map_err(|_| CryptoError::AeadEncrypt)?;
    wrap_k.zeroize();

    let mut out = Vec::with_capacity(32 + ct.len());
    out.extend_from_slice(&ek_pub);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Open a sealed room key with our own keypair. Fails with `SealOpen` if the
/// data is corrupt or was sealed for a different keypair.
pub fn open(
    sealed: &[u8],
    own_pub: &[u8; 32],
    own_secret: &[u8; 32],
) -> Result<[u8; ROOM_KEY_LEN], CryptoError> {
    if sealed.len() < 32 {
        return Err(CryptoError::SealOpen);
    }
    let (epk_bytes, ct) = sealed.split_at(32);
    let epk = to_32(epk_bytes)?;

    let secret = StaticSecret::from(*own_secret);
    let shared = secret.diffie_hellman(&X25519Public::from(epk));
    let mut wrap_k = derive_wrap_key(shared.as_bytes())?;
    let nonce = seal_nonce(&epk, own_pub);

    let cipher = XChaCha20Poly1305::new_from_slice(&wrap_k).map_err(|_| CryptoError::SealOpen)?;
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce), ct)
        .map_err(|_| CryptoError::SealOpen)?;
    wrap_k.zeroize();

    if plaintext.len() != ROOM_KEY_LEN {
        return Err(CryptoError::InvalidKey(
            "unsealed room key has wrong length".into(),
        ));
    }
    let mut out = [0u8; ROOM_KEY_LEN];
    out.copy_from_slice(&plaintext);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;
    use rand::RngCore;

    fn room_key() -> [u8; 32] {
        let mut k = [0u8; 32];
        OsRng.fill_bytes(&mut k);
        k
    }

    #[test]
    fn seal_open_roundtrip() {
        let kp = Keypair::generate();
        let rk = room_key();
        let sealed = seal(&rk, kp.public_bytes()).unwrap();
        let opened = open(&sealed, kp.public_bytes(), kp.secret_bytes()).unwrap();
        assert_eq!(opened, rk);
    }

    #[test]
    fn two_seals_of_same_key_differ() {
        // Fresh ephemeral keypair per call, so ciphertexts must not repeat.
        let kp = Keypair::generate();
        let rk = room_key();
        let a = seal(&rk, kp.public_bytes()).unwrap();
        let b = seal(&rk, kp.public_bytes()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_keypair_fails() {
        let alice = Keypair::generate();
        let mallory = Keypair::generate();
        let rk = room_key();
        let sealed = seal(&rk, alice.public_bytes()).unwrap();
        assert!(matches!(
            open(&sealed, mallory.public_bytes(), mallory.secret_bytes()),
            Err(CryptoError::SealOpen)
        ));
    }

    #[test]
    fn corrupt_envelope_fails() {
        let kp = Keypair::generate();
        let rk = room_key();
        let mut sealed = seal(&rk, kp.public_bytes()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x80;
        assert!(open(&sealed, kp.public_bytes(), kp.secret_bytes()).is_err());
    }

    #[test]
    fn truncated_envelope_fails() {
        let kp = Keypair::generate();
        assert!(matches!(
            open(&[0u8; 16], kp.public_bytes(), kp.secret_bytes()),
            Err(CryptoError::SealOpen)
        ));
    }
}
