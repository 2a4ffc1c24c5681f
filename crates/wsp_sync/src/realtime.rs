//! Realtime channel: persistent WebSocket client.
//!
//! State machine: Disconnected -> Connecting -> Authenticated ->
//! Subscribed(active room set), returning to Disconnected on any failure or
//! server close. The current state is published through a watch channel so
//! the presentation layer can show connectivity.
//!
//! One instance per engine, explicitly constructed; process-wide sharing is
//! by cloning the handle, and the connection is NOT torn down when a single
//! room view closes. After an unexpected close a supervisor reconnects with
//! exponential backoff plus jitter (capped attempts) and re-issues the
//! subscribe directive for every active room.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use wsp_proto::message::Message;
use wsp_proto::realtime::{ClientCommand, ServerEvent, MESSAGES_COLLECTION};

use crate::{config::Config, error::SyncError, session::SessionHandle};

/// Per-room delivery queue depth. A slow consumer stalls only its own room.
const ROOM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Authenticated,
    Subscribed(BTreeSet<String>),
}

struct Inner {
    cfg: Config,
    session: SessionHandle,
    /// Active subscriptions: room id -> typed delivery channel.
    subs: RwLock<HashMap<String, mpsc::Sender<Message>>>,
    /// Outbound frame queue of the live connection, None while disconnected.
    out: Mutex<Option<mpsc::Sender<WsMessage>>>,
    state_tx: watch::Sender<ConnState>,
    state_rx: watch::Receiver<ConnState>,
    shutdown: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct RealtimeSync {
    inner: Arc<Inner>,
}

impl RealtimeSync {
    pub fn new(cfg: Config, session: SessionHandle) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                cfg,
                session,
                subs: RwLock::new(HashMap::new()),
                out: Mutex::new(None),
                state_tx,
                state_rx,
                shutdown: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Observable connectivity state.
    pub fn state(&self) -> watch::Receiver<ConnState> {
        self.inner.state_rx.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.out.lock().await.is_some()
    }

    /// Open the connection if not already open. Idempotent.
    pub async fn connect(&self) -> Result<(), SyncError> {
        self.inner.shutdown.store(false, Ordering::SeqCst);
        self.establish().await
    }

    // Returns a boxed `Send` future rather than an `async fn` opaque type to
    // break the async-recursion cycle (establish -> reader task ->
    // on_connection_lost -> reconnect_loop -> establish), which rustc cannot
    // resolve for `Send` through an opaque self-reference.
    fn establish(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SyncError>> + Send + '_>>
    {
        Box::pin(async move {
        let mut out_guard = self.inner.out.lock().await;
        if out_guard.is_some() {
            return Ok(());
        }
        self.set_state(ConnState::Connecting);

        let url = self.inner.cfg.realtime_url();
        let (ws, _) = match connect_async(url.as_str()).await {
            Ok(conn) => conn,
            Err(e) => {
                self.set_state(ConnState::Disconnected);
                return Err(e.into());
            }
        };
        tracing::info!(target: "wsp_sync", event = "realtime_connected", url = %url);

        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::channel::<WsMessage>(ROOM_CHANNEL_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let hb_tx = tx.clone();
        let heartbeat_every = self.inner.cfg.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_every);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if hb_tx.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        });

        let this = self.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => this.dispatch(&text).await,
                    Ok(WsMessage::Close(_)) => {
                        tracing::info!(target: "wsp_sync", event = "realtime_server_close");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(target: "wsp_sync", event = "realtime_read_error", error = %e);
                        break;
                    }
                    _ => {}
                }
            }
            this.on_connection_lost().await;
        });

        *out_guard = Some(tx);
        drop(out_guard);

        {
            let mut tasks = self.inner.tasks.lock().await;
            tasks.retain(|t| !t.is_finished());
            tasks.extend([writer, heartbeat, reader]);
        }

        // Authentication handshake. Without a token the socket stays open
        // but unauthenticated; the server will reject subscribes.
        if let Some(token) = self.inner.session.token().await {
            self.send_command(ClientCommand::auth(token)).await?;
            self.set_state(ConnState::Authenticated);
        }

        // Re-issue directives for every already-registered room (fresh
        // connect after a drop keeps the subscription set).
        let rooms: Vec<String> = self.inner.subs.read().await.keys().cloned().collect();
        for room_id in &rooms {
            self.send_command(ClientCommand::subscribe_messages(room_id)).await?;
        }
        if !rooms.is_empty() {
            self.set_state(ConnState::Subscribed(rooms.into_iter().collect()));
        }
        Ok(())
        })
    }

    /// Register a typed per-room channel and direct the server to include
    /// that room. Independent per room; safe before `connect()`.
    pub async fn subscribe(&self, room_id: &str) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
        self.inner.subs.write().await.insert(room_id.to_string(), tx);

        if self.is_connected().await {
            if let Err(e) = self
                .send_command(ClientCommand::subscribe_messages(room_id))
                .await
            {
                tracing::warn!(target: "wsp_sync", event = "subscribe_send_failed", room_id = %room_id, error = %e);
            }
            self.publish_subscription_state().await;
        }
        rx
    }

    /// Remove a room's channel and directive. Safe when not subscribed.
    pub async fn unsubscribe(&self, room_id: &str) {
        let removed = self.inner.subs.write().await.remove(room_id).is_some();
        if removed && self.is_connected().await {
            if let Err(e) = self
                .send_command(ClientCommand::unsubscribe_messages(room_id))
                .await
            {
                tracing::debug!(target: "wsp_sync", event = "unsubscribe_send_failed", room_id = %room_id, error = %e);
            }
            self.publish_subscription_state().await;
        }
    }

    /// Tear down the connection and stop the reconnect supervisor.
    pub async fn close(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        *self.inner.out.lock().await = None;
        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        self.set_state(ConnState::Disconnected);
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn dispatch(&self, text: &str) {
        let Some(message) = parse_message_event(text) else {
            // Malformed payloads and unknown collections are dropped, not
            // errors: the realtime stream multiplexes collections we do
            // not track.
            tracing::trace!(target: "wsp_sync", event = "realtime_event_dropped");
            return;
        };

        let subs = self.inner.subs.read().await;
        match subs.get(&message.room_id) {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    tracing::debug!(target: "wsp_sync", event = "realtime_receiver_gone");
                }
            }
            None => {
                tracing::trace!(
                    target: "wsp_sync",
                    event = "realtime_unmatched_room",
                    room_id = %message.room_id
                );
            }
        }
    }

    async fn send_command(&self, cmd: ClientCommand) -> Result<(), SyncError> {
        let json = serde_json::to_string(&cmd)?;
        let out = self.inner.out.lock().await;
        match out.as_ref() {
            Some(tx) => tx
                .send(WsMessage::Text(json))
                .await
                .map_err(|_| SyncError::Network("realtime writer closed".into())),
            None => Err(SyncError::Network("realtime channel not connected".into())),
        }
    }

    async fn publish_subscription_state(&self) {
        let rooms: BTreeSet<String> = self.inner.subs.read().await.keys().cloned().collect();
        let current = self.inner.state_rx.borrow().clone();
        match (rooms.is_empty(), current) {
            (false, ConnState::Authenticated | ConnState::Subscribed(_)) => {
                self.set_state(ConnState::Subscribed(rooms));
            }
            (true, ConnState::Subscribed(_)) => {
                self.set_state(ConnState::Authenticated);
            }
            _ => {}
        }
    }

    async fn on_connection_lost(&self) {
        *self.inner.out.lock().await = None;
        self.set_state(ConnState::Disconnected);
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.reconnect_loop().await;
        });
    }

    async fn reconnect_loop(&self) {
        let base = self.inner.cfg.reconnect_base;
        let cap = self.inner.cfg.reconnect_cap;
        for attempt in 0..self.inner.cfg.reconnect_max_retries {
            if self.inner.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let delay = backoff_delay(base, cap, attempt);
            tokio::time::sleep(delay).await;

            match self.establish().await {
                Ok(()) => {
                    tracing::info!(target: "wsp_sync", event = "realtime_reconnected", attempt);
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "wsp_sync",
                        event = "realtime_reconnect_failed",
                        attempt,
                        error = %e
                    );
                }
            }
        }
        tracing::error!(
            target: "wsp_sync",
            event = "realtime_reconnect_gave_up",
            retries = self.inner.cfg.reconnect_max_retries
        );
    }

    fn set_state(&self, state: ConnState) {
        self.inner.state_tx.send_replace(state);
    }
}

/// Exponential backoff with uniform jitter: `base * 2^attempt`, capped,
/// plus up to half the capped delay again.
fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let delay = exp.min(cap);
    let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis().max(1) as u64 / 2);
    delay + Duration::from_millis(jitter_ms)
}

/// Parse an inbound frame into a message for dispatch. Anything that is
/// not a well-formed event for the messages collection yields None.
fn parse_message_event(text: &str) -> Option<Message> {
    let ev: ServerEvent = serde_json::from_str(text).ok()?;
    if ev.collection != MESSAGES_COLLECTION {
        return None;
    }
    serde_json::from_value(ev.record).ok()
}
