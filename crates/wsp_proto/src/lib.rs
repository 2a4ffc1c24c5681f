//! wsp_proto — Whisper client protocol types
//!
//! Record and frame types shared between the sync engine and the backend.
//! These map directly to JSON bodies on the wire (PocketBase collection
//! records and realtime frames).
//!
//! - `message`  — encrypted message records + display ordering
//! - `envelope` — sealed room-key envelopes
//! - `room`     — room records + direct-room pair keys
//! - `realtime` — persistent-channel control frames and events
//! - `api`      — REST request/response bodies

pub mod api;
pub mod envelope;
pub mod message;
pub mod realtime;
pub mod room;
