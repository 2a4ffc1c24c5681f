//! wsp_crypto — Whisper client cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Public APIs return opaque newtypes to prevent accidental misuse.
//!
//! # Module layout
//! - `keys`   — long-term X25519 identity keypair + public-key newtype
//! - `sealed` — anonymous sealed-box wrap/unwrap of room keys
//! - `aead`   — XChaCha20-Poly1305 encrypt/decrypt helpers
//! - `legacy` — deterministic two-party room key (demo-era fallback)
//! - `kdf`    — Argon2id vault key + HKDF expansion
//! - `error`  — unified error type

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod legacy;
pub mod sealed;

pub use error::CryptoError;

/// Room keys are always exactly 32 bytes.
pub const ROOM_KEY_LEN: usize = 32;

/// AEAD nonces are always exactly 24 bytes (XChaCha20).
pub const NONCE_LEN: usize = 24;
