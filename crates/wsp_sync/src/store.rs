//! Per-room ordered, deduplicated message logs.
//!
//! `merge` is the single integration point for all three delivery paths:
//! push events, poll batches, and the local optimistic insert after a
//! successful send. It behaves identically regardless of source or arrival
//! order, so no cross-channel ordering guarantee is needed from the
//! backend.
//!
//! Each room's log is owned by exactly one state holder; the outer map is
//! only taken briefly to look the holder up, so two rooms never contend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};

use wsp_proto::message::Message;

/// Emitted whenever a merge adds at least one new message to a room.
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    pub room_id: String,
    /// Number of messages the merge actually added (duplicates excluded).
    pub added: usize,
}

/// Deduplicate by `id` (set union) and stable-sort by `(created_at, id)`
/// ascending. Idempotent: merging the same batch twice changes nothing.
pub fn merge(existing: &[Message], incoming: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<&str> = existing.iter().map(|m| m.id.as_str()).collect();
    let mut merged: Vec<Message> = existing.to_vec();
    for msg in incoming {
        if seen.insert(msg.id.as_str()) {
            merged.push(msg.clone());
        }
    }
    merged.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    merged
}

#[derive(Default)]
struct RoomLog {
    messages: Vec<Message>,
}

struct StoreInner {
    rooms: RwLock<HashMap<String, Arc<Mutex<RoomLog>>>>,
    events: broadcast::Sender<RoomUpdate>,
}

/// Shared message store handle. Clone to hand to the push task and the
/// poll loop; both funnel into the same per-room logs.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<StoreInner>,
}

impl MessageStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(StoreInner {
                rooms: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    async fn room_log(&self, room_id: &str) -> Arc<Mutex<RoomLog>> {
        if let Some(log) = self.inner.rooms.read().await.get(room_id) {
            return log.clone();
        }
        let mut rooms = self.inner.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RoomLog::default())))
            .clone()
    }

    /// Merge a batch into one room's log. Returns how many messages were
    /// actually new. Safe to call concurrently from any delivery path.
    pub async fn merge_batch(&self, room_id: &str, batch: Vec<Message>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let log = self.room_log(room_id).await;
        let mut log = log.lock().await;

        let before = log.messages.len();
        log.messages = merge(&log.messages, &batch);
        let added = log.messages.len() - before;
        drop(log);

        if added > 0 {
            // Nobody listening is fine; the store works without observers.
            let _ = self.inner.events.send(RoomUpdate {
                room_id: room_id.to_string(),
                added,
            });
        }
        added
    }

    /// Snapshot of one room's log in display order.
    pub async fn room_messages(&self, room_id: &str) -> Vec<Message> {
        let log = self.room_log(room_id).await;
        let log = log.lock().await;
        log.messages.clone()
    }

    /// Subscribe to merge notifications for the presentation layer.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<RoomUpdate> {
        self.inner.events.subscribe()
    }

    /// Drop one room's log (view closed and history no longer needed).
    pub async fn clear_room(&self, room_id: &str) {
        self.inner.rooms.write().await.remove(room_id);
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
