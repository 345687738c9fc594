// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent WebSocket channel to the local print daemon.
//
// One logical connection per `Channel`. A reader task routes inbound frames:
// pushes go to the event dispatcher, everything else to the correlator. A
// writer task drains an unbounded queue so `send` never blocks on the socket.
// Unexpected drops are repaired by a supervisor task that reopens the socket
// on the configured reconnect schedule; caller-initiated closes are not.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use attendo_core::config::{ClientConfig, RetryPolicy};
use attendo_core::error::{AttendoError, Result};

use crate::correlator::{ApiNameCorrelator, Correlator};
use crate::events::EventDispatcher;
use crate::protocol::{ApiName, InboundMessage, Request, ResultAck};
use crate::retry::{self, RetryDecision};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the daemon socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// Operations the connected daemon supports. Computed once per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    operations: BTreeSet<ApiName>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            operations: ApiName::ALL.into_iter().collect(),
        }
    }

    /// Build from a configured list of operation names. `None` means every
    /// operation; unknown names are logged and ignored.
    pub fn from_surface(surface: Option<&[String]>) -> Self {
        let Some(names) = surface else {
            return Self::all();
        };
        let operations = names
            .iter()
            .filter_map(|name| match name.parse::<ApiName>() {
                Ok(api) => Some(api),
                Err(e) => {
                    warn!(error = %e, "ignoring unknown operation in api_surface");
                    None
                }
            })
            .collect();
        Self { operations }
    }

    pub fn supports(&self, api: ApiName) -> bool {
        self.operations.contains(&api)
    }

    pub fn require(&self, api: ApiName) -> Result<()> {
        if self.supports(api) {
            Ok(())
        } else {
            Err(AttendoError::Unsupported(api.to_string()))
        }
    }
}

struct Inner {
    endpoint: String,
    connect_timeout: Duration,
    reconnect: RetryPolicy,
    api_surface: Option<Vec<String>>,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    capabilities: Mutex<Capabilities>,
    open_lock: tokio::sync::Mutex<()>,
    intentional_close: AtomicBool,
    generation: AtomicU64,
    sockets_opened: AtomicU64,
    correlator: Arc<dyn Correlator>,
    events: Arc<EventDispatcher>,
    lost_tx: mpsc::UnboundedSender<u64>,
    lost_rx: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
}

/// Handle to the daemon connection. Clones share the same socket.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_correlator(config, Arc::new(ApiNameCorrelator::new()))
    }

    pub fn with_correlator(config: &ClientConfig, correlator: Arc<dyn Correlator>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                endpoint: config.endpoint.clone(),
                connect_timeout: config.connect_timeout(),
                reconnect: config.reconnect,
                api_surface: config.api_surface.clone(),
                state,
                outbound: Mutex::new(None),
                capabilities: Mutex::new(Capabilities::all()),
                open_lock: tokio::sync::Mutex::new(()),
                intentional_close: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                sockets_opened: AtomicU64::new(0),
                correlator,
                events: Arc::new(EventDispatcher::new()),
                lost_tx,
                lost_rx: Mutex::new(Some(lost_rx)),
            }),
        }
    }

    /// Open the socket, or return at once if it is already open.
    ///
    /// Resolves with the daemon's capabilities once the handshake completes.
    /// State transitions are published on [`Channel::state_changes`].
    pub async fn open(&self) -> Result<Capabilities> {
        self.ensure_supervisor();
        self.inner.intentional_close.store(false, Ordering::SeqCst);
        open_socket(&self.inner).await
    }

    /// Send a request and wait up to `window` for its response.
    ///
    /// Always resolves: transport failures and timeouts come back as
    /// synthetic acks with [`ERROR_NOT_CONNECTED`](crate::protocol::ERROR_NOT_CONNECTED)
    /// or [`ERROR_TIMEOUT`](crate::protocol::ERROR_TIMEOUT). A request that
    /// cannot be encoded yields [`ERROR_INVALID_REQUEST`](crate::protocol::ERROR_INVALID_REQUEST).
    pub async fn send(&self, request: &Request, window: Duration) -> ResultAck {
        let key = request.api_name.as_str();
        let text = match request.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(api = key, error = %e, "request could not be encoded");
                return ResultAck::invalid_request(key, &e.to_string());
            }
        };

        let sender = if self.is_open() {
            self.inner.outbound.lock().ok().and_then(|o| o.clone())
        } else {
            None
        };
        let Some(sender) = sender else {
            debug!(api = key, "send while not connected");
            return ResultAck::not_connected();
        };

        let pending = self.inner.correlator.register(key);
        if sender.send(Message::Text(text)).is_err() {
            self.inner.correlator.expire(key, pending.token);
            return ResultAck::not_connected();
        }
        debug!(api = key, "request sent");

        match tokio::time::timeout(window, pending.response).await {
            Ok(Ok(ack)) => ack,
            // Sender dropped without an answer.
            Ok(Err(_)) => ResultAck::not_connected(),
            Err(_) => {
                self.inner.correlator.expire(key, pending.token);
                warn!(api = key, window_ms = window.as_millis(), "request timed out");
                ResultAck::timeout(key, window)
            }
        }
    }

    /// Close the socket. An intentional close suppresses reconnection; a
    /// non-intentional one behaves like an unexpected drop.
    pub fn close(&self, intentional: bool) {
        if intentional {
            self.inner.intentional_close.store(true, Ordering::SeqCst);
        }
        let sender = self.inner.outbound.lock().ok().and_then(|mut o| o.take());
        if let Some(sender) = sender {
            let _ = sender.send(Message::Close(None));
        }
        self.inner.set_state(ConnectionState::Closed);
        info!(intentional, "daemon connection closed by caller");
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Stream of connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Capabilities of the current (or last) connection.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    pub fn events(&self) -> Arc<EventDispatcher> {
        Arc::clone(&self.inner.events)
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Number of sockets opened over the channel's lifetime.
    pub fn sockets_opened(&self) -> u64 {
        self.inner.sockets_opened.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    fn ensure_supervisor(&self) {
        let rx = self.inner.lost_rx.lock().ok().and_then(|mut rx| rx.take());
        if let Some(rx) = rx {
            tokio::spawn(supervise(Arc::downgrade(&self.inner), rx));
        }
    }
}

impl Inner {
    fn is_open(&self) -> bool {
        *self.state.borrow() == ConnectionState::Open
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(state = ?next, "daemon connection state changed");
        }
    }

    fn handle_text(&self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(message) if message.is_push() => {
                let delivered = self.events.dispatch(&message);
                debug!(
                    code = message.result_ack.error_code,
                    delivered, "push dispatched"
                );
            }
            Ok(message) => {
                self.correlator.resolve(&message);
            }
            Err(e) => warn!(error = %e, "malformed daemon message dropped"),
        }
    }

    fn connection_lost(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
        self.set_state(ConnectionState::Closed);

        if self.intentional_close.load(Ordering::SeqCst) {
            debug!(generation, "reader finished after intentional close");
            return;
        }
        warn!(endpoint = %self.endpoint, "connection to print daemon lost");
        let _ = self.lost_tx.send(generation);
    }
}

async fn open_socket(inner: &Arc<Inner>) -> Result<Capabilities> {
    let _guard = inner.open_lock.lock().await;
    if inner.is_open() {
        debug!("daemon connection already open");
        return Ok(inner.capabilities());
    }

    inner.set_state(ConnectionState::Connecting);
    let connect = tokio_tungstenite::connect_async(inner.endpoint.as_str());
    let ws = match tokio::time::timeout(inner.connect_timeout, connect).await {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            inner.set_state(ConnectionState::Closed);
            warn!(endpoint = %inner.endpoint, error = %e, "daemon connection failed");
            return Err(AttendoError::Transport(format!(
                "connect to {}: {e}",
                inner.endpoint
            )));
        }
        Err(_) => {
            inner.set_state(ConnectionState::Closed);
            warn!(endpoint = %inner.endpoint, "daemon connection timed out");
            return Err(AttendoError::Timeout {
                operation: "connect".into(),
                after: inner.connect_timeout,
            });
        }
    };

    let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
    inner.sockets_opened.fetch_add(1, Ordering::SeqCst);

    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();
    if let Ok(mut outbound) = inner.outbound.lock() {
        *outbound = Some(tx);
    }
    let capabilities = Capabilities::from_surface(inner.api_surface.as_deref());
    if let Ok(mut current) = inner.capabilities.lock() {
        *current = capabilities.clone();
    }

    // Open before the reader starts so an immediate drop is not overwritten.
    inner.set_state(ConnectionState::Open);
    tokio::spawn(write_loop(sink, rx));
    tokio::spawn(read_loop(Arc::downgrade(inner), stream, generation));

    info!(endpoint = %inner.endpoint, generation, "connected to print daemon");
    Ok(capabilities)
}

async fn write_loop(mut sink: SplitSink<WsStream, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "daemon socket write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(weak: Weak<Inner>, mut stream: SplitStream<WsStream>, generation: u64) {
    while let Some(frame) = stream.next().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        match frame {
            Ok(Message::Text(text)) => inner.handle_text(&text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "daemon socket read failed");
                break;
            }
        }
    }
    if let Some(inner) = weak.upgrade() {
        inner.connection_lost(generation);
    }
}

/// Reopens the socket after unexpected drops until the channel is dropped.
async fn supervise(weak: Weak<Inner>, mut lost: mpsc::UnboundedReceiver<u64>) {
    while let Some(generation) = lost.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        reconnect(&inner, generation).await;
    }
}

async fn reconnect(inner: &Arc<Inner>, generation: u64) {
    let mut attempts = 0;
    loop {
        let delay = match retry::next_attempt(attempts, &inner.reconnect) {
            RetryDecision::RetryAfter(delay) => delay,
            _ => {
                warn!(generation, attempts, "giving up reconnecting to print daemon");
                return;
            }
        };
        tokio::time::sleep(delay).await;

        if inner.intentional_close.load(Ordering::SeqCst) || inner.is_open() {
            return;
        }
        attempts += 1;
        info!(attempt = attempts, "reconnecting to print daemon");
        match open_socket(inner).await {
            Ok(_) => {
                info!(attempt = attempts, "reconnected to print daemon");
                return;
            }
            Err(e) => warn!(attempt = attempts, error = %e, "reconnect attempt failed"),
        }
    }
}
