//! Relay client runtime.
//!
//! A supervisor task owns the transport. It walks
//! `disconnected -> connecting -> connected`, schedules reconnects through
//! [`ReconnectState`] and switches to HTTP polling once the retries are
//! exhausted. Everything the caller touches ([`SyncClient::send`],
//! [`SyncClient::subscribe`], [`SyncClient::status`]) is non-blocking.

use std::sync::Arc;

use convoy_schemas::{ConvoyMessage, DeviceRole, MessageOrigin, MessageType, Payload, Register};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::backoff::{ReconnectDecision, ReconnectState};
use crate::config::SyncClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::{ConnectionState, ConnectionStatus};
use crate::subscribers::{SubscriberSet, Subscription};

/// How an outbound message left the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the live socket.
    Socket,
    /// Handed to a background HTTP submission.
    Http,
}

struct Inner {
    config: SyncClientConfig,
    status: watch::Sender<ConnectionStatus>,
    subscribers: Arc<SubscriberSet>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    http: reqwest::Client,
    reconnect_now: Notify,
    runtime: Handle,
}

/// Client side of the convoy relay protocol.
pub struct SyncClient {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("server_url", &self.inner.config.server_url)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

enum SessionEnd {
    Shutdown,
    Failed(SyncError),
}

enum PollEnd {
    Shutdown,
    Reconnect,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PollRequest {
    device_role: Option<DeviceRole>,
}

impl SyncClient {
    /// Start the supervisor on the current tokio runtime.
    pub fn start(config: SyncClientConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        let runtime = Handle::try_current()?;
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            config,
            status,
            subscribers: SubscriberSet::new(),
            outbound: Mutex::new(None),
            http,
            reconnect_now: Notify::new(),
            runtime,
        });

        let supervisor = inner.runtime.spawn(supervise(inner.clone(), shutdown_rx));
        info!(url = %inner.config.ws_url(), "Sync client started");

        Ok(Self {
            inner,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Check whether the socket is up.
    pub fn is_connected(&self) -> bool {
        self.status().state.is_connected()
    }

    /// Role assigned by the relay, if any.
    pub fn assigned_role(&self) -> Option<DeviceRole> {
        self.status().assigned_role
    }

    /// Register a callback for every inbound message.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConvoyMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Send a payload on behalf of this device. Never blocks and never retries.
    pub fn send(&self, payload: Payload) -> SyncResult<Delivery> {
        let message = ConvoyMessage::new(self.inner.origin(), payload);
        let text = message.encode()?;

        {
            let outbound = self.inner.outbound.lock();
            if let Some(tx) = outbound.as_ref() {
                if tx.send(text.clone()).is_ok() {
                    return Ok(Delivery::Socket);
                }
            }
        }

        let inner = self.inner.clone();
        let kind = message.kind();
        self.inner.runtime.spawn(async move {
            let url = format!("{}/convoy/send", inner.config.http_base_url());
            let result = inner
                .http
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(text)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match result {
                Ok(_) => debug!(%kind, "Submitted message over HTTP"),
                Err(e) => warn!(%kind, error = %e, "HTTP submission failed, message dropped"),
            }
        });
        Ok(Delivery::Http)
    }

    /// Leave polling mode and retry the socket right away.
    pub fn reconnect(&self) {
        info!("Reconnect requested");
        self.inner.reconnect_now.notify_one();
    }

    /// Stop the transport and drop every subscriber.
    pub async fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync supervisor ended abnormally");
            }
        }
        self.inner.subscribers.clear();
        self.inner.outbound.lock().take();
        self.inner.status.send_modify(|status| {
            status.state = ConnectionState::Disconnected;
            status.polling_active = false;
        });
        info!("Sync client disconnected");
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl Inner {
    fn origin(&self) -> MessageOrigin {
        let status = *self.status.borrow();
        status
            .assigned_role
            .or(self.config.requested_role)
            .map_or(MessageOrigin::Unassigned, MessageOrigin::Device)
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            debug!(from = ?status.state, to = ?state, "Connection state changed");
            status.state = state;
            true
        });
    }

    /// Decode and dispatch one frame, returning the kind of message it held.
    fn handle_text(&self, text: &str) -> Option<MessageType> {
        match ConvoyMessage::decode(text) {
            Ok(message) => Some(self.handle_message(message)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                None
            }
        }
    }

    fn handle_message(&self, message: ConvoyMessage) -> MessageType {
        let kind = message.kind();
        match &message.payload {
            Payload::RoleAssigned(assigned) => {
                info!(role = %assigned.assigned_role, "Relay assigned role");
                let role = assigned.assigned_role;
                self.status.send_modify(|status| status.assigned_role = Some(role));
            }
            Payload::RoleRejected(rejected) => {
                warn!(reason = %rejected.reason, "Relay rejected registration");
            }
            _ => {}
        }
        self.subscribers.dispatch(&message);
        kind
    }

    async fn poll_once(&self) -> SyncResult<usize> {
        let url = format!("{}/convoy/poll", self.config.http_base_url());
        let request = PollRequest {
            device_role: self.status.borrow().assigned_role.or(self.config.requested_role),
        };
        let batch: Vec<serde_json::Value> = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut delivered = 0;
        for value in batch {
            match ConvoyMessage::from_value(value) {
                Ok(message) => {
                    self.handle_message(message);
                    delivered += 1;
                }
                Err(e) => warn!(error = %e, "Dropping malformed polled message"),
            }
        }
        Ok(delivered)
    }
}

async fn supervise(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let policy = inner.config.reconnect_policy();
    let mut backoff = ReconnectState::default();

    loop {
        if *shutdown.borrow() {
            break;
        }

        inner.set_state(ConnectionState::Connecting);
        let end = run_session(&inner, &mut shutdown, &mut backoff).await;
        inner.outbound.lock().take();
        inner.set_state(ConnectionState::Disconnected);

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Failed(e) => debug!(error = %e, "Relay session ended"),
        }

        match backoff.on_failure(&policy) {
            ReconnectDecision::Retry { attempt, delay } => {
                inner
                    .status
                    .send_modify(|status| status.reconnect_attempt = attempt);
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                    _ = inner.reconnect_now.notified() => backoff.reset(),
                }
            }
            ReconnectDecision::FallbackToPolling => {
                warn!(
                    attempts = backoff.attempt(),
                    interval_ms = inner.config.poll_interval_ms,
                    "Reconnect attempts exhausted, falling back to HTTP polling"
                );
                inner
                    .status
                    .send_modify(|status| status.polling_active = true);
                match poll_until_interrupted(&inner, &mut shutdown).await {
                    PollEnd::Shutdown => break,
                    PollEnd::Reconnect => {
                        backoff.reset();
                        inner.status.send_modify(|status| {
                            status.polling_active = false;
                            status.reconnect_attempt = 0;
                        });
                    }
                }
            }
        }
    }

    inner.outbound.lock().take();
    inner.status.send_modify(|status| {
        status.state = ConnectionState::Disconnected;
        status.polling_active = false;
    });
}

async fn run_session(
    inner: &Inner,
    shutdown: &mut watch::Receiver<bool>,
    backoff: &mut ReconnectState,
) -> SessionEnd {
    let url = inner.config.ws_url();
    let timeout = inner.config.connect_timeout();

    let connected = tokio::select! {
        result = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())) => result,
        _ = shutdown.changed() => return SessionEnd::Shutdown,
    };
    let (socket, _) = match connected {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            debug!(%url, error = %e, "Relay connect failed");
            return SessionEnd::Failed(e.into());
        }
        Err(_) => return SessionEnd::Failed(SyncError::ConnectTimeout(inner.config.connect_timeout_ms)),
    };

    // The attempt counter survives until the relay hands out a role, so a
    // relay that keeps rejecting us still ends in polling.
    inner.status.send_modify(|status| {
        status.state = ConnectionState::Connected;
        status.polling_active = false;
    });
    info!(%url, "Connected to relay");

    let (mut sink, mut stream) = socket.split();

    let register = ConvoyMessage::new(
        inner.config.requested_role.map_or(MessageOrigin::Unassigned, MessageOrigin::Device),
        Payload::Register(Register {
            requested_role: inner.config.requested_role,
        }),
    );
    let text = match register.encode() {
        Ok(text) => text,
        Err(e) => return SessionEnd::Failed(e.into()),
    };
    if let Err(e) = sink.send(Message::Text(text.into())).await {
        return SessionEnd::Failed(e.into());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    *inner.outbound.lock() = Some(tx);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            Some(text) = rx.recv() => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    return SessionEnd::Failed(e.into());
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if inner.handle_text(text.as_str()) == Some(MessageType::RoleAssigned) {
                        registered(inner, backoff);
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        if inner.handle_text(text) == Some(MessageType::RoleAssigned) {
                            registered(inner, backoff);
                        }
                    }
                    Err(_) => warn!(len = bytes.len(), "Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.as_str().to_string()).unwrap_or_default();
                    info!(%reason, "Relay closed the connection");
                    return SessionEnd::Failed(SyncError::Closed(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Relay connection lost");
                    return SessionEnd::Failed(e.into());
                }
                None => return SessionEnd::Failed(SyncError::Closed("stream ended".to_string())),
            },
        }
    }
}

/// The relay accepted us. Only now does the reconnect counter start over.
fn registered(inner: &Inner, backoff: &mut ReconnectState) {
    backoff.on_connected();
    inner
        .status
        .send_modify(|status| status.reconnect_attempt = 0);
}

async fn poll_until_interrupted(inner: &Inner, shutdown: &mut watch::Receiver<bool>) -> PollEnd {
    let mut interval = tokio::time::interval(inner.config.poll_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return PollEnd::Shutdown,
            _ = inner.reconnect_now.notified() => {
                info!("Leaving polling mode");
                return PollEnd::Reconnect;
            }
            _ = interval.tick() => {
                match inner.poll_once().await {
                    Ok(0) => {}
                    Ok(count) => debug!(count, "Polled messages"),
                    Err(e) => debug!(error = %e, "Poll failed"),
                }
            }
        }
    }
}
