//! Identity key management
//!
//! Each device holds one long-term X25519 keypair. The public half is
//! uploaded to the directory service so peers can seal room keys for us;
//! the secret half never leaves the local KeyVault.
//!
//! The keypair is box-style (key agreement), not a signing key: sealed-box
//! envelopes provide confidentiality only, and sender authentication comes
//! from the transport/session layer.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Public key newtype ───────────────────────────────────────────────────────

/// 32-byte X25519 public key, base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidKey(format!("Public key must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(arr))
    }

    /// Human-readable fingerprint: BLAKE3 of the public key, truncated to
    /// 20 bytes, hex-encoded in groups of 4 for display.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Identity keypair ─────────────────────────────────────────────────────────

/// Long-term identity keypair. Drop clears the secret via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct Keypair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl Keypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKeyBytes(X25519Public::from(&secret).to_bytes());
        Self {
            public,
            secret_bytes: secret.to_bytes(),
        }
    }

    /// Reconstruct a keypair from the stored 32-byte secret.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Secret key must be 32 bytes, got {}", bytes.len()))
        })?;
        let secret = StaticSecret::from(arr);
        let public = PublicKeyBytes(X25519Public::from(&secret).to_bytes());
        Ok(Self {
            public,
            secret_bytes: arr,
        })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.public.0
    }

    /// Export the public key in base64 for directory upload.
    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_b64_roundtrip() {
        let kp = Keypair::generate();
        let b64 = kp.public_b64();
        let restored = PublicKeyBytes::from_b64(&b64).unwrap();
        assert_eq!(restored, kp.public);
    }

    #[test]
    fn rejects_wrong_length_public_key() {
        let short = STANDARD.encode([1u8; 16]);
        assert!(PublicKeyBytes::from_b64(&short).is_err());
    }

    #[test]
    fn keypair_restores_from_secret() {
        let kp = Keypair::generate();
        let restored = Keypair::from_secret_bytes(kp.secret_bytes()).unwrap();
        assert_eq!(restored.public, kp.public);
    }

    #[test]
    fn fingerprint_is_stable_and_grouped() {
        let kp = Keypair::generate();
        let fp1 = kp.public.fingerprint();
        let fp2 = kp.public.fingerprint();
        assert_eq!(fp1, fp2);
        // 20 bytes hex = 40 chars in groups of 4 joined by spaces
        assert_eq!(fp1.split(' ').count(), 10);
    }
}
