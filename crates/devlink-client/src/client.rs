//! Device client — owns the WebSocket lifecycle, the connection state
//! machine, and the request/response multiplexer.
//!
//! One client per device.  The handle is cheap to clone and safe to use
//! from many tasks; all shared state lives behind the inner `Arc`.

use std::sync::Arc;
use std::time::Duration;

use devlink_protocol::{Envelope, EnvelopeKind};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::correlation::CorrelationTable;
use crate::dispatch::{CommandHandler, DispatchTable};
use crate::events::{ClientEvent, EventBus};
use crate::heartbeat;
use crate::reconnect::ReconnectPolicy;
use crate::types::{ClientError, ConnectionState, DeviceIdentity, RequestError};

const OUTBOUND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 128;

/// Immutable connection configuration, assembled by the builder.
pub(crate) struct Config {
    pub(crate) server_url: String,
    pub(crate) identity: DeviceIdentity,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect: ReconnectPolicy,
}

/// One `connect()` session: its shutdown token and the connection task.
struct Session {
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

struct Inner {
    config: Config,
    state: Mutex<ConnectionState>,
    /// Current connection's table.  Replaced wholesale on every transition
    /// into `Connected`, after the previous one was failed.
    correlation: Mutex<CorrelationTable>,
    dispatch: DispatchTable,
    outbound: Mutex<Option<mpsc::Sender<Envelope>>>,
    events: EventBus,
    session: Mutex<Option<Session>>,
}

/// A connected (or connecting) device agent.
///
/// Create via [`DeviceClientBuilder`](crate::builder::DeviceClientBuilder).
#[derive(Clone)]
pub struct DeviceClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient").finish_non_exhaustive()
    }
}

impl DeviceClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::DeviceClientBuilder {
        crate::builder::DeviceClientBuilder::new()
    }

    pub(crate) fn from_config(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                correlation: Mutex::new(CorrelationTable::new()),
                dispatch: DispatchTable::new(),
                outbound: Mutex::new(None),
                events: EventBus::new(EVENT_BUFFER),
                session: Mutex::new(None),
            }),
        }
    }

    /// Start connecting to the coordinator.  Must be called on a Tokio
    /// runtime.  A no-op while already `Connecting`, `Connected`, or
    /// `Reconnecting`; from `Failed` it starts over with a fresh attempt
    /// budget.
    pub fn connect(&self) {
        let mut session = self.inner.session.lock();
        let state = self.state();
        if matches!(
            state,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        ) {
            tracing::debug!(state = ?state, "connect: already running");
            return;
        }
        if let Some(old) = session.take() {
            old.task.abort();
        }

        self.inner.set_state(ConnectionState::Connecting);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_connection(Arc::clone(&self.inner), shutdown.clone()));
        *session = Some(Session { shutdown, task });
    }

    /// Tear the connection down.  Every pending request is failed before
    /// this returns; the reconnect timer is stopped for good.
    pub async fn disconnect(&self) {
        let session = self.inner.session.lock().take();
        match session {
            Some(session) => {
                session.shutdown.cancel();
                self.inner.teardown("client disconnected");
                let _ = session.task.await;
                // The task may have moved the state to Reconnecting between
                // its cancellation check and the backoff sleep; settle it
                // once the task is gone so connect() is never a no-op here.
                self.inner.set_state(ConnectionState::Disconnected);
            }
            None => {
                // Nothing running; still normalize a `Failed` state.
                self.inner.set_state(ConnectionState::Disconnected);
            }
        }
    }

    /// Fire-and-forget send.  Fails synchronously unless `Connected`.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let outbound = self.inner.outbound.lock().clone();
        match outbound {
            Some(tx) => tx.send(envelope).await.map_err(|_| ClientError::NotConnected),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Send a command and await its correlated reply.
    ///
    /// Exactly one of {matching response, timeout, disconnect failure}
    /// resolves the wait.  A correlated error-kind reply surfaces as
    /// [`RequestError::Remote`].  Dropping the returned future cancels
    /// only this request.
    pub async fn request(
        &self,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, RequestError> {
        if self.state() != ConnectionState::Connected {
            return Err(RequestError::NotConnected);
        }
        let outbound = self
            .inner
            .outbound
            .lock()
            .clone()
            .ok_or(RequestError::NotConnected)?;
        let correlation = self.inner.correlation.lock().clone();

        let envelope = Envelope::command(&self.inner.config.identity.device_id, action, payload);
        tracing::debug!(
            action = %action,
            message_id = %envelope.message_id,
            "sending request"
        );

        // Track before sending so the response cannot race the insert.
        let wait = correlation.track(envelope.message_id.clone(), timeout);
        if outbound.send(envelope).await.is_err() {
            // Dropping `wait` untracks the entry.
            return Err(RequestError::NotConnected);
        }

        let reply = wait.await?;
        match reply.kind {
            EnvelopeKind::Error => Err(RequestError::Remote(
                reply
                    .error_reason()
                    .unwrap_or("unspecified remote error")
                    .to_string(),
            )),
            _ => Ok(reply.payload),
        }
    }

    /// Register `handler` for `action`, replacing any existing one.
    pub fn register_handler<H: CommandHandler>(&self, action: impl Into<String>, handler: H) {
        self.inner.dispatch.register(action, handler);
    }

    /// Subscribe to connection events.  Each call gets an independent
    /// receiver; lagging receivers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Number of requests currently awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlation.lock().len()
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "connection state");
            *state = next;
        }
    }

    fn build_url(&self) -> String {
        format!(
            "{}/ws/device/{}",
            self.config.server_url.trim_end_matches('/'),
            self.config.identity.device_id
        )
    }

    /// Common post-connection cleanup: drop the outbound channel, fail all
    /// in-flight requests, settle on `Disconnected`.
    fn teardown(&self, reason: &str) {
        *self.outbound.lock() = None;
        let table = self.correlation.lock().clone();
        table.fail_all(reason);

        let prev = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };
        if prev != ConnectionState::Disconnected {
            tracing::debug!(from = ?prev, to = ?ConnectionState::Disconnected, "connection state");
        }
        // Observers only hear about sessions that actually connected;
        // failed attempts surface through the reconnect path instead.
        if prev == ConnectionState::Connected {
            self.events.emit(ClientEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    /// Decode one text frame and route it by kind.
    async fn route_inbound(
        &self,
        text: &str,
        correlation: &CorrelationTable,
        outbound: &mpsc::Sender<Envelope>,
        conn_cancel: &CancellationToken,
    ) {
        let envelope = match devlink_protocol::decode(text) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed envelope");
                return;
            }
        };
        self.events.emit(ClientEvent::Message(envelope.clone()));

        match envelope.kind {
            EnvelopeKind::Response | EnvelopeKind::Ack => {
                if envelope.correlation_id.is_empty() {
                    tracing::debug!(
                        message_id = %envelope.message_id,
                        "dropping uncorrelated reply"
                    );
                } else {
                    let correlation_id = envelope.correlation_id.clone();
                    correlation.resolve(&correlation_id, envelope);
                }
            }
            EnvelopeKind::Error => {
                if envelope.correlation_id.is_empty() {
                    let reason = envelope
                        .error_reason()
                        .unwrap_or("unspecified remote error")
                        .to_string();
                    tracing::warn!(reason = %reason, "error envelope from coordinator");
                    self.events.emit(ClientEvent::Error(reason));
                } else {
                    let correlation_id = envelope.correlation_id.clone();
                    correlation.resolve(&correlation_id, envelope);
                }
            }
            EnvelopeKind::Command => {
                tracing::debug!(
                    action = %envelope.action,
                    message_id = %envelope.message_id,
                    "received command"
                );
                self.events.emit(ClientEvent::Command {
                    action: envelope.action.clone(),
                    message_id: envelope.message_id.clone(),
                });

                let dispatch = self.dispatch.clone();
                let outbound = outbound.clone();
                let device_id = self.config.identity.device_id.clone();
                let cancel = conn_cancel.child_token();
                tokio::spawn(async move {
                    let reply = dispatch.dispatch(&device_id, &envelope, cancel).await;
                    let _ = outbound.send(reply).await;
                });
            }
            EnvelopeKind::Heartbeat => {
                let ack = Envelope::heartbeat_ack(&self.config.identity.device_id, &envelope);
                let _ = outbound.send(ack).await;
            }
            EnvelopeKind::HeartbeatAck => {
                // Informational only; transport-level ping/pong is the
                // liveness signal.
                tracing::trace!("heartbeat acknowledged");
            }
            EnvelopeKind::Register => {
                tracing::debug!("ignoring register envelope from coordinator");
            }
            EnvelopeKind::Unknown => {
                tracing::debug!(
                    message_id = %envelope.message_id,
                    "dropping unknown-kind envelope"
                );
            }
        }
    }
}

/// The connection task: connect, run, and reconnect per policy until the
/// shutdown token fires or the attempt budget is exhausted.
async fn run_connection(inner: Arc<Inner>, shutdown: CancellationToken) {
    let device_id = inner.config.identity.device_id.clone();
    let mut attempts: u32 = 0;

    loop {
        inner.set_state(ConnectionState::Connecting);

        let result = tokio::select! {
            r = connect_once(&inner, &shutdown) => r,
            _ = shutdown.cancelled() => {
                tracing::info!(device_id = %device_id, "shutdown requested");
                return;
            }
        };

        let reason = match &result {
            Ok(()) => "connection closed".to_string(),
            Err(e) => e.to_string(),
        };
        inner.teardown(&reason);

        match result {
            Ok(()) => {
                // The session reached Connected before it ended, so the
                // failure streak starts over.
                attempts = 0;
                tracing::info!(device_id = %device_id, "connection closed");
            }
            Err(ref e) => {
                tracing::warn!(device_id = %device_id, attempts, error = %e, "connection attempt failed");
            }
        }

        if shutdown.is_cancelled() {
            return;
        }

        if inner.config.reconnect.should_give_up(attempts) {
            tracing::error!(device_id = %device_id, attempts, "max reconnect attempts exhausted");
            inner.set_state(ConnectionState::Failed);
            inner.events.emit(ClientEvent::Error(format!(
                "reconnect exhausted after {attempts} attempts"
            )));
            return;
        }

        attempts += 1;
        let delay = inner.config.reconnect.delay_for_attempt(attempts);
        inner.set_state(ConnectionState::Reconnecting);
        tracing::info!(
            device_id = %device_id,
            delay_ms = delay.as_millis() as u64,
            attempt = attempts,
            "reconnecting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => return,
        }
    }
}

/// Single connection lifecycle: open transport, register, pump messages.
///
/// `Ok(())` means the session reached `Connected` and later ended (close or
/// transport error); `Err` means it failed before registration completed.
async fn connect_once(inner: &Arc<Inner>, shutdown: &CancellationToken) -> anyhow::Result<()> {
    let device_id = inner.config.identity.device_id.clone();
    let url = inner.build_url();
    tracing::info!(url = %url, device_id = %device_id, "connecting to coordinator");

    let (ws, _response) = tokio_tungstenite::connect_async(&url).await?;
    let (mut sink, mut stream) = ws.split();

    let register = Envelope::register(&device_id, inner.config.identity.register_payload());
    let json = devlink_protocol::encode(&register)?;
    sink.send(Message::Text(json)).await?;

    // Fresh, connection-scoped correlation table.  The previous one was
    // already failed in teardown, so no response can cross connections.
    let correlation = CorrelationTable::new();
    *inner.correlation.lock() = correlation.clone();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(OUTBOUND_BUFFER);
    *inner.outbound.lock() = Some(outbound_tx.clone());

    inner.set_state(ConnectionState::Connected);
    inner.events.emit(ClientEvent::Connected);
    tracing::info!(device_id = %device_id, "connected and registered");

    // Scoped to this connection; also fires on client shutdown.
    let conn_cancel = shutdown.child_token();

    let heartbeat_task = tokio::spawn(heartbeat::run(
        device_id.clone(),
        inner.config.heartbeat_interval,
        outbound_tx.clone(),
        conn_cancel.clone(),
    ));

    // Writer task: serializes outbound envelopes onto the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            let json = match devlink_protocol::encode(&envelope) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound envelope");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: route inbound frames until the transport ends.
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                inner
                    .route_inbound(&text, &correlation, &outbound_tx, &conn_cancel)
                    .await;
            }
            Ok(Message::Close(_)) => {
                tracing::info!(device_id = %device_id, "coordinator closed connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(device_id = %device_id, error = %e, "transport error");
                break;
            }
        }
    }

    // Stop this connection's helpers; in-flight handlers observe the token.
    conn_cancel.cancel();
    heartbeat_task.abort();
    writer_task.abort();

    Ok(())
}
