//! Realtime event channel: one shared Socket.IO connection, many listeners.
//!
//! DESIGN
//! ======
//! `EventChannel` is an owned, cloneable handle injected into every surface
//! that needs push events. Listeners register per event name and receive
//! payloads on their own queue. Registration is reference counted:
//! - the first `subscribe` spawns the connection task,
//! - dropping the last `Subscription` aborts it and closes the socket.
//!
//! LIFECYCLE
//! =========
//! 1. Dial `{base}/socket.io/?EIO=4&transport=websocket`
//! 2. Wait for the Engine.IO open handshake, send namespace connect (`40`)
//! 3. Answer pings, fan `42[...]` events out to listeners
//! 4. On close, error, or missed ping window → back off and redial
//!
//! ERROR HANDLING
//! ==============
//! Transport errors never reach listeners; they are logged and drive the
//! reconnect loop. Undecodable packets are logged and skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use frames::{Packet, SocketPacket};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::{ReconnectPolicy, YardConfig};

/// Event carrying newly produced coils.
pub const NEW_COIL_EVENT: &str = "new_coil";

/// Event carrying newly assigned crane tasks.
pub const NEW_TASK_EVENT: &str = "new_task";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("websocket failed: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connection closed before handshake")]
    ClosedBeforeHandshake,
    #[error("no packet within {0:?}")]
    PingTimeout(Duration),
    #[error("server rejected namespace connect: {0}")]
    Rejected(String),
    #[error("packet decode failed: {0}")]
    Codec(#[from] frames::CodecError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}

/// Realtime connection status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Where the connection task dials, if anywhere.
#[derive(Debug, Clone)]
enum Dial {
    Url(String),
    /// Never connects; payloads arrive only through [`EventChannel::publish`].
    Offline,
}

struct ChannelInner {
    dial: Dial,
    reconnect: ReconnectPolicy,
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, HashMap<u64, mpsc::UnboundedSender<Value>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    status: watch::Sender<ConnectionStatus>,
}

/// Shared handle to one realtime connection.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

/// A registered listener for one event name. Dropping it deregisters.
pub struct Subscription {
    event: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<Value>,
    channel: Weak<ChannelInner>,
}

// =============================================================================
// CHANNEL
// =============================================================================

impl EventChannel {
    #[must_use]
    pub fn new(config: &YardConfig) -> Self {
        Self::build(Dial::Url(config.ws_url()), config.reconnect)
    }

    /// A channel that never dials. Used by tests and local injection.
    #[must_use]
    pub fn offline() -> Self {
        Self::build(Dial::Offline, ReconnectPolicy::default())
    }

    fn build(dial: Dial, reconnect: ReconnectPolicy) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                dial,
                reconnect,
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(HashMap::new()),
                task: Mutex::new(None),
                status,
            }),
        }
    }

    /// Register a listener for `event`. Starts the connection if this is the
    /// first listener. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn subscribe(&self, event: &str) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = lock(&self.inner.listeners);
        listeners.entry(event.to_owned()).or_default().insert(id, tx);
        debug!(%event, id, "channel: subscribe");
        self.inner.start();
        drop(listeners);

        Subscription { event: event.to_owned(), id, rx, channel: Arc::downgrade(&self.inner) }
    }

    /// Deliver `payload` to every listener of `event`. Returns how many
    /// listeners received it.
    pub fn publish(&self, event: &str, payload: Value) -> usize {
        self.inner.deliver(event, payload)
    }

    /// Total live listeners across all events.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).values().map(HashMap::len).sum()
    }

    /// Whether a connection task is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.task).as_ref().is_some_and(|task| !task.is_finished())
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }
}

impl ChannelInner {
    fn start(self: &Arc<Self>) {
        let Dial::Url(url) = &self.dial else {
            return;
        };
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|running| !running.is_finished()) {
            return;
        }
        info!(%url, "channel: starting connection");
        *task = Some(tokio::spawn(connection_loop(Arc::downgrade(self), url.clone(), self.reconnect)));
    }

    fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            info!("channel: last listener detached, connection stopped");
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
    }

    fn deliver(&self, event: &str, payload: Value) -> usize {
        let mut listeners = lock(&self.listeners);
        let Some(targets) = listeners.get_mut(event) else {
            debug!(%event, "channel: no listeners");
            return 0;
        };
        targets.retain(|_, tx| tx.send(payload.clone()).is_ok());
        targets.len()
    }

    /// Lock order is always `listeners` then `task`.
    fn unsubscribe(&self, event: &str, id: u64) {
        let mut listeners = lock(&self.listeners);
        if let Some(targets) = listeners.get_mut(event) {
            targets.remove(&id);
            if targets.is_empty() {
                listeners.remove(event);
            }
        }
        debug!(%event, id, "channel: unsubscribe");
        if listeners.is_empty() {
            self.stop();
        }
    }
}

/// Lock a registry mutex, recovering the guard if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

impl Subscription {
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Next payload, or `None` once the channel handle is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Non-blocking poll for an already queued payload.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.unsubscribe(&self.event, self.id);
        }
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Dial, run, and redial with exponential backoff until aborted or the
/// channel is dropped.
async fn connection_loop(inner: Weak<ChannelInner>, url: String, policy: ReconnectPolicy) {
    let mut backoff_ms = policy.initial_ms;

    loop {
        let Some(channel) = inner.upgrade() else { return };
        channel.status.send_replace(ConnectionStatus::Connecting);

        match connect_and_run(&channel, &url).await {
            Ok(true) => {
                info!("channel: disconnected cleanly");
                backoff_ms = policy.initial_ms;
            }
            Ok(false) => info!("channel: closed before handshake"),
            Err(e) => warn!(error = %e, "channel: connection failed"),
        }

        channel.status.send_replace(ConnectionStatus::Disconnected);
        drop(channel);

        let delay = with_jitter(backoff_ms);
        debug!(delay_ms = delay, "channel: reconnecting after backoff");
        tokio::time::sleep(Duration::from_millis(delay)).await;
        backoff_ms = policy.next_delay(backoff_ms);
    }
}

/// Up to 25% random jitter on top of `delay_ms`.
fn with_jitter(delay_ms: u64) -> u64 {
    let spread = delay_ms / 4;
    if spread == 0 {
        return delay_ms;
    }
    delay_ms + rand::rng().random_range(0..=spread)
}

/// Run one connection. Returns `Ok(true)` if the handshake completed before
/// the connection ended, `Ok(false)` for a clean close before handshake.
async fn connect_and_run(channel: &ChannelInner, url: &str) -> Result<bool, ChannelError> {
    let (stream, _) = connect_async(url).await?;
    let (mut write, mut read) = stream.split();

    let handshake = loop {
        let Some(message) = read.next().await else {
            return Ok(false);
        };
        match message? {
            Message::Text(text) => match frames::decode_packet(text.as_str())? {
                Packet::Open(handshake) => break handshake,
                other => debug!(packet = ?other, "channel: packet before open"),
            },
            Message::Close(_) => return Err(ChannelError::ClosedBeforeHandshake),
            _ => {}
        }
    };

    let window = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    info!(sid = %handshake.sid, ?window, "channel: engine open");

    let connect = frames::encode_packet(&Packet::Message(SocketPacket::connect()));
    write.send(Message::Text(connect.into())).await?;

    loop {
        let next = tokio::time::timeout(window, read.next()).await.map_err(|_| ChannelError::PingTimeout(window))?;
        let Some(message) = next else {
            return Ok(true);
        };

        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(true),
            _ => continue,
        };

        let packet = match frames::decode_packet(text.as_str()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "channel: undecodable packet");
                continue;
            }
        };

        match packet {
            Packet::Ping(data) => {
                let pong = frames::encode_packet(&Packet::Pong(data));
                write.send(Message::Text(pong.into())).await?;
            }
            Packet::Close => return Ok(true),
            Packet::Message(SocketPacket::Connect { .. }) => {
                info!("channel: namespace connected");
                channel.status.send_replace(ConnectionStatus::Connected);
            }
            Packet::Message(SocketPacket::ConnectError { data, .. }) => {
                return Err(ChannelError::Rejected(data.to_string()));
            }
            Packet::Message(SocketPacket::Disconnect { .. }) => return Ok(true),
            Packet::Message(SocketPacket::Event { name, args, .. }) => {
                let payload = args.into_iter().next().unwrap_or(Value::Null);
                let delivered = channel.deliver(&name, payload);
                debug!(event = %name, delivered, "channel: event");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;
