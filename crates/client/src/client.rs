//! The forwarding client facade: connection lifecycle, outbound calls, and
//! the reconnect supervisor.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use forward_protocol::{ClientIdentity, ClientType, Frame};

use crate::dispatch;
use crate::error::ClientError;
use crate::events::{ClientEvent, EventBus, EventKind, SubscriptionId};
use crate::metrics::ClientMetrics;
use crate::pending::{CallIdGenerator, PendingCalls};
use crate::registry::{MethodHandler, MethodRegistry};
use crate::retry::{FixedInterval, RetryPolicy};

/// Default connection path on the forwarding server.
pub const DEFAULT_PATH: &str = "/forward";

const OUTBOUND_BUFFER: usize = 32;

/// Connection state for the forwarding-server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the server
    Disconnected,
    /// Attempting to establish connection
    Connecting,
    /// Successfully connected
    Connected,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    /// Convert from u8 (atomic storage).
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Handle to one live connection: the outbound queue and the lifetime token
/// that stops its IO tasks.
struct Transport {
    tx: mpsc::Sender<String>,
    token: CancellationToken,
}

impl Drop for Transport {
    /// A dropped handle always stops its connection's IO tasks, so replacing
    /// or discarding one cannot leave a reader running against shared state.
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Bidirectional JSON-RPC client for a forwarding server.
///
/// Owns a single logical WebSocket connection. Cheap to clone; clones share
/// the connection, the pending-call table, the event bus, and the method
/// registry.
pub struct ForwardingClient {
    identity: ClientIdentity,
    state: Arc<AtomicU8>,
    /// Generation counter distinguishing successive connections, so a
    /// lingering task from a dead connection cannot tear down a new one
    epoch: Arc<AtomicU64>,
    endpoint: Arc<Mutex<Option<Url>>>,
    outbound: Arc<Mutex<Option<Transport>>>,
    pending: Arc<Mutex<PendingCalls>>,
    ids: Arc<CallIdGenerator>,
    events: EventBus,
    registry: MethodRegistry,
    policy: Arc<Mutex<Box<dyn RetryPolicy>>>,
    supervisor: Arc<Mutex<Option<CancellationToken>>>,
    reconnect_notify: Arc<Notify>,
    /// Held across `open` and the teardown in `disconnect`, so at most one
    /// lifecycle operation touches the transport at a time
    lifecycle: Arc<Mutex<()>>,
    /// Cancelled by `disconnect`; a connection attempt still in flight
    /// observes it and aborts instead of committing a new transport
    shutdown: Arc<Mutex<CancellationToken>>,
    metrics: Arc<ClientMetrics>,
}

impl ForwardingClient {
    /// Create a client with a freshly generated client id.
    pub fn new(client_type: ClientType) -> Self {
        Self::with_identity(ClientIdentity::generate(client_type))
    }

    /// Create a client with an explicit identity.
    pub fn with_identity(identity: ClientIdentity) -> Self {
        let events = EventBus::new();
        let registry = MethodRegistry::default();
        registry.attach(&events);
        registry.register_ping(identity.clone());

        Self {
            identity,
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8())),
            epoch: Arc::new(AtomicU64::new(0)),
            endpoint: Arc::new(Mutex::new(None)),
            outbound: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(PendingCalls::default())),
            ids: Arc::new(CallIdGenerator::default()),
            events,
            registry,
            policy: Arc::new(Mutex::new(Box::new(FixedInterval::default()))),
            supervisor: Arc::new(Mutex::new(None)),
            reconnect_notify: Arc::new(Notify::new()),
            lifecycle: Arc::new(Mutex::new(())),
            shutdown: Arc::new(Mutex::new(CancellationToken::new())),
            metrics: Arc::new(ClientMetrics::default()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.identity.client_id
    }

    pub fn client_type(&self) -> ClientType {
        self.identity.client_type
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Counters for frames dropped by design (malformed, unmatched id).
    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Replace the reconnect schedule. Takes effect from the next attempt.
    pub async fn set_retry_policy(&self, policy: impl RetryPolicy) {
        *self.policy.lock().await = Box::new(policy);
    }

    /// Subscribe a callback to one event kind. Callable at any time,
    /// including from within another callback.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl FnMut(ClientEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(kind, callback)
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Register a handler answering inbound calls to `name`.
    ///
    /// Registrations accumulate; see [`MethodHandler`] for the consequences
    /// of registering the same name twice.
    pub fn register_method(&self, name: impl Into<String>, handler: impl MethodHandler + 'static) {
        self.registry.register(name, Arc::new(handler));
    }

    /// Connect to `ws://host:port/forward` with this client's identity.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ClientError> {
        self.connect_with_path(host, port, DEFAULT_PATH).await
    }

    /// Connect to an explicit path (normalized to a leading `/`).
    ///
    /// A no-op returning `Ok` while already connected. On success the
    /// reconnect supervisor is (re)armed and keeps the connection alive until
    /// [`disconnect`](Self::disconnect).
    pub async fn connect_with_path(
        &self,
        host: &str,
        port: u16,
        path: &str,
    ) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }

        let endpoint = build_endpoint(host, port, path, &self.identity)?;
        *self.endpoint.lock().await = Some(endpoint.clone());

        // Re-arm after a previous disconnect
        {
            let mut shutdown = self.shutdown.lock().await;
            if shutdown.is_cancelled() {
                *shutdown = CancellationToken::new();
            }
        }

        self.open(&endpoint).await?;
        self.arm_supervisor().await;
        Ok(())
    }

    /// Close the connection and stop the reconnect supervisor.
    ///
    /// A connection attempt still in flight (a supervisor retry mid
    /// handshake) is aborted rather than allowed to commit, so the client is
    /// guaranteed disconnected once this returns. All outstanding calls fail
    /// with [`ClientError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        self.shutdown.lock().await.cancel();
        if let Some(token) = self.supervisor.lock().await.take() {
            token.cancel();
        }

        // Waits out any open() already holding the lifecycle lock; the
        // cancelled shutdown token makes it abort instead of committing
        let _guard = self.lifecycle.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.close_transport(epoch).await;
    }

    /// Issue a call and await its correlated response.
    ///
    /// Fails immediately with [`ClientError::NotConnected`] while not
    /// connected; nothing is registered and no frame is sent in that case.
    /// There is no timeout: the call resolves on a matching response or when
    /// the connection closes.
    pub async fn call_method(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let tx = self
            .outbound
            .lock()
            .await
            .as_ref()
            .map(|t| t.tx.clone())
            .ok_or(ClientError::NotConnected)?;

        let id = self.ids.next();
        let frame = Frame::request(id.clone(), method, params);
        let text = serde_json::to_string(&frame)?;

        let (response_tx, response_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(id.clone(), method.to_string(), response_tx);

        if tx.send(text).await.is_err() {
            // Transport went away between the state check and the send
            self.pending.lock().await.remove(&id);
            return Err(ClientError::SendFailed("connection closed".into()));
        }

        tracing::trace!(id = %id, method = %method, "Sent method call");
        response_rx
            .await
            .map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Send an arbitrary JSON-serializable payload verbatim (no envelope,
    /// no correlation, no response).
    pub async fn send_message<T: Serialize>(&self, payload: &T) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let tx = self
            .outbound
            .lock()
            .await
            .as_ref()
            .map(|t| t.tx.clone())
            .ok_or(ClientError::NotConnected)?;

        let text = serde_json::to_string(payload)?;
        tx.send(text)
            .await
            .map_err(|_| ClientError::SendFailed("connection closed".into()))
    }

    /// Open the socket and spawn the per-connection read/write tasks.
    ///
    /// Used by both `connect` and the reconnect supervisor; does not touch
    /// the supervisor itself. Serialized by the lifecycle lock: a user
    /// connect racing a supervisor attempt must never produce two live
    /// connections.
    async fn open(&self, endpoint: &Url) -> Result<(), ClientError> {
        let _guard = self.lifecycle.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        let shutdown = self.shutdown.lock().await.clone();
        if shutdown.is_cancelled() {
            return Err(ClientError::Connect("attempt abandoned by disconnect".into()));
        }

        // Dropping a stale handle from a previous connection cancels its
        // token and stops its tasks
        if self.outbound.lock().await.take().is_some() {
            tracing::debug!("Dropped stale transport handle before reconnecting");
        }

        self.state
            .store(ConnectionState::Connecting.to_u8(), Ordering::SeqCst);

        let connected = tokio::select! {
            _ = shutdown.cancelled() => {
                self.state
                    .store(ConnectionState::Disconnected.to_u8(), Ordering::SeqCst);
                return Err(ClientError::Connect("attempt abandoned by disconnect".into()));
            }
            result = connect_async(endpoint.as_str()) => result,
        };
        let (ws_stream, _) = match connected {
            Ok(ok) => ok,
            Err(e) => {
                self.state
                    .store(ConnectionState::Disconnected.to_u8(), Ordering::SeqCst);
                self.events.dispatch(ClientEvent::Error(e.to_string()));
                return Err(ClientError::Connect(e.to_string()));
            }
        };
        tracing::info!("Connected to forwarding server at {}", endpoint);

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        let conn_token = CancellationToken::new();
        // Epoch moves before the transport is stored, so a task still winding
        // down from the previous connection can no longer pass the guard
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.outbound.lock().await = Some(Transport {
            tx: tx.clone(),
            token: conn_token.clone(),
        });

        self.state
            .store(ConnectionState::Connected.to_u8(), Ordering::SeqCst);
        self.events.dispatch(ClientEvent::Connected);

        // Write task: drain the outbound queue in submission order
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = write.send(Message::Text(text)).await {
                    tracing::error!("Failed to send frame: {}", e);
                    break;
                }
            }
        });

        // Read task: dispatch every inbound frame, then run the close path.
        // The lifetime token lets an intentional disconnect stop it even
        // while the peer keeps the socket open.
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = conn_token.cancelled() => break,
                    msg = read.next() => msg,
                };
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch::handle_inbound(
                            &text,
                            &client.pending,
                            &client.events,
                            &tx,
                            &client.metrics,
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Server closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        client.events.dispatch(ClientEvent::Error(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
            client.close_transport(epoch).await;
        });

        Ok(())
    }

    /// Tear down the current connection's state exactly once.
    ///
    /// Shared by intentional disconnect and the read task's close path; the
    /// epoch guard keeps a lingering task from a dead connection from
    /// touching a newer one.
    async fn close_transport(&self, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }

        let was_connected = self
            .state
            .swap(ConnectionState::Disconnected.to_u8(), Ordering::SeqCst)
            == ConnectionState::Connected.to_u8();

        if let Some(transport) = self.outbound.lock().await.take() {
            drop(transport);
        }
        let failed = self.pending.lock().await.fail_all();
        if failed > 0 {
            tracing::debug!("Rejected {} outstanding calls on close", failed);
        }

        if was_connected {
            self.events.dispatch(ClientEvent::Disconnected);
            self.reconnect_notify.notify_one();
        }
    }

    /// Start (or restart) the reconnect supervisor.
    ///
    /// Re-arming always cancels the previous supervisor first, so there is
    /// never more than one.
    async fn arm_supervisor(&self) {
        let mut slot = self.supervisor.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());

        let client = self.clone();
        tokio::spawn(async move {
            client.reconnect_loop(token).await;
        });
    }

    async fn reconnect_loop(&self, token: CancellationToken) {
        loop {
            if self.is_connected() {
                // Idle until the connection drops; the policy only advances
                // while disconnected
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = self.reconnect_notify.notified() => {}
                }
                continue;
            }

            let delay = self.policy.lock().await.next_delay();
            let Some(delay) = delay else {
                tracing::warn!("Retry policy exhausted, giving up on reconnection");
                return;
            };
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if self.is_connected() {
                continue;
            }

            let endpoint = self.endpoint.lock().await.clone();
            let Some(endpoint) = endpoint else { return };

            match self.open(&endpoint).await {
                Ok(()) => {
                    self.policy.lock().await.reset();
                    tracing::info!("Reconnected to forwarding server");
                }
                Err(e) => {
                    // Swallowed so the supervisor keeps retrying
                    tracing::warn!("Reconnection attempt failed: {}", e);
                }
            }
        }
    }
}

impl Clone for ForwardingClient {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            state: Arc::clone(&self.state),
            epoch: Arc::clone(&self.epoch),
            endpoint: Arc::clone(&self.endpoint),
            outbound: Arc::clone(&self.outbound),
            pending: Arc::clone(&self.pending),
            ids: Arc::clone(&self.ids),
            events: self.events.clone(),
            registry: self.registry.clone(),
            policy: Arc::clone(&self.policy),
            supervisor: Arc::clone(&self.supervisor),
            reconnect_notify: Arc::clone(&self.reconnect_notify),
            lifecycle: Arc::clone(&self.lifecycle),
            shutdown: Arc::clone(&self.shutdown),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Build the connect endpoint from host, port, path, and identity.
///
/// `path` is normalized to always start with `/`.
fn build_endpoint(
    host: &str,
    port: u16,
    path: &str,
    identity: &ClientIdentity,
) -> Result<Url, ClientError> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let mut endpoint = Url::parse(&format!("ws://{host}:{port}{path}"))
        .map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;
    endpoint
        .query_pairs_mut()
        .append_pair("clientType", identity.client_type.as_str())
        .append_pair("clientId", &identity.client_id);
    Ok(endpoint)
}
