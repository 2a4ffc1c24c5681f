//! Periodic pull of a room's messages, complementing the realtime channel.
//!
//! One loop per actively viewed room. Network failures during a tick are
//! swallowed and retried on the next tick; they never reach the caller.
//! Dropping the handle cancels the loop (view teardown).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::{directory::Directory, store::MessageStore};

pub struct PollHandle {
    task: JoinHandle<()>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start polling `room_id` every `every` until the handle is dropped.
pub fn spawn(
    directory: Arc<dyn Directory>,
    store: MessageStore,
    room_id: String,
    every: Duration,
) -> PollHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match directory.list_messages(&room_id).await {
                Ok(batch) => {
                    let added = store.merge_batch(&room_id, batch).await;
                    if added > 0 {
                        tracing::debug!(
                            target: "wsp_sync",
                            event = "poll_merge",
                            room_id = %room_id,
                            added
                        );
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::debug!(
                        target: "wsp_sync",
                        event = "poll_tick_failed",
                        room_id = %room_id,
                        error = %e
                    );
                }
                Err(e) => {
                    // Auth/state problems are not fixed by waiting, but the
                    // background loop still must not crash the view; keep
                    // ticking and let the next explicit user action surface
                    // the failure.
                    tracing::warn!(
                        target: "wsp_sync",
                        event = "poll_tick_error",
                        room_id = %room_id,
                        error = %e
                    );
                }
            }
        }
    });
    PollHandle { task }
}
