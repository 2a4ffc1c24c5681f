//! wsp_store — Whisper client encrypted local key storage
//!
//! - `vault` — in-memory master key, unlocked by password or raw key
//! - `kv`    — SQLite-backed key-value store, values encrypted at rest
//! - `error` — unified error type

pub mod error;
pub mod kv;
pub mod vault;

pub use error::StoreError;
pub use kv::KeyVault;
pub use vault::Vault;
