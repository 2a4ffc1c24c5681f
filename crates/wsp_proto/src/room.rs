//! Room records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::pb_datetime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: RoomKind,

    /// Deterministic lookup key for direct rooms (sorted id pair), so
    /// "open or create" cannot race into duplicates.
    #[serde(rename = "pairKey", default, skip_serializing_if = "Option::is_none")]
    pub pair_key: Option<String>,

    pub participants: Vec<String>,

    #[serde(rename = "created", with = "pb_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn is_direct(&self) -> bool {
        self.kind == RoomKind::Direct
    }
}

/// Sorted id pair, `<low>_<high>`: both sides compute the same key.
pub fn pair_key(a: &str, b: &str) -> String {
    if a < b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}
