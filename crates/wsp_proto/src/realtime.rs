//! Persistent-channel control frames and events.
//!
//! Outbound frames carry a client-chosen `id` so the server can correlate
//! acks; inbound events carry `{collection, record}`. Anything that does
//! not parse as a `ServerEvent`, or targets a collection the client does
//! not track, is dropped by the dispatcher without raising an error.

use serde::{Deserialize, Serialize};

/// The only collection the sync engine subscribes to.
pub const MESSAGES_COLLECTION: &str = "messages";

/// Outbound control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Authentication handshake, sent once per connection open.
    Auth { id: String, token: String },

    /// Scoped subscription: `filter` narrows the collection to one room.
    Subscribe {
        id: String,
        collection: String,
        filter: String,
    },

    Unsubscribe {
        id: String,
        collection: String,
        filter: String,
    },
}

impl ClientCommand {
    pub fn auth(token: impl Into<String>) -> Self {
        ClientCommand::Auth {
            id: format!("auth-{}", uuid::Uuid::new_v4()),
            token: token.into(),
        }
    }

    pub fn subscribe_messages(room_id: &str) -> Self {
        ClientCommand::Subscribe {
            id: subscription_id(room_id),
            collection: MESSAGES_COLLECTION.to_string(),
            filter: room_filter(room_id),
        }
    }

    pub fn unsubscribe_messages(room_id: &str) -> Self {
        ClientCommand::Unsubscribe {
            id: subscription_id(room_id),
            collection: MESSAGES_COLLECTION.to_string(),
            filter: room_filter(room_id),
        }
    }
}

/// Inbound event: a record change in some collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEvent {
    pub collection: String,
    pub record: serde_json::Value,
}

/// Stable per-room subscription id.
pub fn subscription_id(room_id: &str) -> String {
    format!("sub-messages-{room_id}")
}

/// Backend filter expression scoping a subscription to one room.
pub fn room_filter(room_id: &str) -> String {
    format!("room=\"{room_id}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_shape() {
        let cmd = ClientCommand::subscribe_messages("r42");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["id"], "sub-messages-r42");
        assert_eq!(json["collection"], "messages");
        assert_eq!(json["filter"], "room=\"r42\"");
    }

    #[test]
    fn auth_frame_carries_token() {
        let cmd = ClientCommand::auth("tok");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "auth");
        assert_eq!(json["token"], "tok");
    }

    #[test]
    fn unsubscribe_matches_subscribe_id() {
        let sub = ClientCommand::subscribe_messages("r1");
        let unsub = ClientCommand::unsubscribe_messages("r1");
        let (sub_id, unsub_id) = match (&sub, &unsub) {
            (
                ClientCommand::Subscribe { id: a, .. },
                ClientCommand::Unsubscribe { id: b, .. },
            ) => (a.clone(), b.clone()),
            _ => unreachable!(),
        };
        assert_eq!(sub_id, unsub_id);
    }

    #[test]
    fn server_event_parses_unknown_record_shapes() {
        let ev: ServerEvent =
            serde_json::from_str(r#"{"collection":"presence","record":{"x":1}}"#).unwrap();
        assert_eq!(ev.collection, "presence");
    }
}
