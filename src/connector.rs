//! Transport connector.
//!
//! Owns at most one live transport at a time and exposes observable
//! connection state. A fresh transport instance is built for every connect
//! call; any prior transport is torn down first. Raw events fan out on a
//! broadcast channel; the reconnect loop listens on a separate closure
//! channel to distinguish manual disconnects from transport failures.

use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::error::SyncResult;
use crate::event::WireEvent;
use crate::identity::Identity;
use crate::transport::{ClientTransport, MemoryTransport, WsTransport};

/// How the connector builds transports
#[derive(Debug, Clone)]
pub enum TransportMode {
    WebSocket {
        url: String,
    },
    /// In-process channels, mirrors the WebSocket contract for tests
    Memory {
        server_tx: broadcast::Sender<WireEvent>,
        client_tx: broadcast::Sender<WireEvent>,
    },
}

/// Why the live transport went away
#[derive(Debug, Clone, PartialEq)]
pub enum CloseKind {
    /// Caller-initiated; terminal, never followed by a reconnect
    Manual,
    /// Transport failure; candidate for backoff reconnection
    Abnormal(String),
}

struct ActiveTransport {
    transport: ClientTransport,
    reader_cancel: CancellationToken,
}

/// Owns the single push-channel connection for one logical consumer
pub struct Connector {
    mode: TransportMode,
    inner: Mutex<Option<ActiveTransport>>,
    connected_tx: watch::Sender<bool>,
    error_tx: watch::Sender<Option<String>>,
    event_tx: broadcast::Sender<WireEvent>,
    closed_tx: broadcast::Sender<CloseKind>,
}

impl Connector {
    pub fn new(mode: TransportMode) -> Self {
        let (connected_tx, _) = watch::channel(false);
        let (error_tx, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(256);
        let (closed_tx, _) = broadcast::channel(16);

        Self {
            mode,
            inner: Mutex::new(None),
            connected_tx,
            error_tx,
            event_tx,
            closed_tx,
        }
    }

    /// Establish a fresh transport for the given identity.
    ///
    /// A no-op (logged, `Ok`) when the identity lacks a positive id or a
    /// token. Tears down any prior transport first, announces room
    /// membership, flips `is_connected`, then spawns the reader task.
    pub async fn connect(&self, identity: &Identity) -> SyncResult<()> {
        if !identity.is_valid() {
            tracing::warn!(
                role = %identity.role,
                id = identity.id,
                "missing identity or token, order sync disabled"
            );
            return Ok(());
        }

        // At most one live transport per connector
        self.teardown().await;

        let transport = match &self.mode {
            TransportMode::WebSocket { url } => {
                match WsTransport::connect(url, &identity.token).await {
                    Ok(t) => ClientTransport::Ws(t),
                    Err(e) => {
                        self.error_tx.send_replace(Some(e.to_string()));
                        return Err(e);
                    }
                }
            }
            TransportMode::Memory {
                server_tx,
                client_tx,
            } => ClientTransport::Memory(MemoryTransport::new(server_tx, client_tx)),
        };

        // Exactly one join announcement per connection
        transport.write_event(&identity.join_event()).await?;
        tracing::info!(role = %identity.role, id = identity.id, "joined order room");

        let reader_cancel = CancellationToken::new();

        *self.inner.lock().await = Some(ActiveTransport {
            transport: transport.clone(),
            reader_cancel: reader_cancel.clone(),
        });
        // Flag flips before the reader spawns so a reader that fails on an
        // instantly-dead transport cannot have its `false` overwritten
        self.connected_tx.send_replace(true);
        self.error_tx.send_replace(None);
        self.spawn_reader(transport, reader_cancel);

        Ok(())
    }

    fn spawn_reader(&self, transport: ClientTransport, cancel: CancellationToken) {
        let event_tx = self.event_tx.clone();
        let connected_tx = self.connected_tx.clone();
        let error_tx = self.error_tx.clone();
        let closed_tx = self.closed_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    read = transport.read_event() => match read {
                        Ok(event) => {
                            if let Err(e) = event_tx.send(event) {
                                tracing::debug!("no subscribers for event: {e}");
                            }
                        }
                        Err(e) => {
                            tracing::warn!("push channel lost: {e}");
                            connected_tx.send_replace(false);
                            error_tx.send_replace(Some(e.to_string()));
                            let _ = closed_tx.send(CloseKind::Abnormal(e.to_string()));
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Close the transport with a normal-closure code. Idempotent; safe to
    /// call while already disconnected.
    pub async fn disconnect(&self) {
        let active = self.inner.lock().await.take();
        let Some(active) = active else {
            return;
        };

        active.reader_cancel.cancel();
        if let Err(e) = active.transport.close().await {
            tracing::debug!("transport close: {e}");
        }
        self.connected_tx.send_replace(false);
        let _ = self.closed_tx.send(CloseKind::Manual);
        tracing::info!("push channel disconnected (manual)");
    }

    /// Quietly drop the current transport without emitting a closure event.
    /// Used when connect replaces a stale instance.
    async fn teardown(&self) {
        let active = self.inner.lock().await.take();
        if let Some(active) = active {
            active.reader_cancel.cancel();
            if let Err(e) = active.transport.close().await {
                tracing::debug!("stale transport close: {e}");
            }
            self.connected_tx.send_replace(false);
        }
    }

    /// Attempt to send an event. Returns whether a send was attempted, which
    /// is only the case while connected. Never errors; write failures are
    /// logged and picked up by the reader task.
    pub async fn send_message(&self, event: &str, data: Value) -> bool {
        if !*self.connected_tx.borrow() {
            return false;
        }
        let guard = self.inner.lock().await;
        let Some(active) = guard.as_ref() else {
            return false;
        };
        if let Err(e) = active
            .transport
            .write_event(&WireEvent::new(event, data))
            .await
        {
            tracing::warn!("send failed: {e}");
        }
        true
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    pub fn connection_error(&self) -> Option<String> {
        self.error_tx.borrow().clone()
    }

    pub fn watch_connection_error(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    pub(crate) fn set_connection_error(&self, message: impl Into<String>) {
        self.error_tx.send_replace(Some(message.into()));
    }

    /// Subscribe to raw events from the live transport
    pub fn subscribe_events(&self) -> broadcast::Receiver<WireEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to closure notifications (manual vs abnormal)
    pub fn subscribe_closed(&self) -> broadcast::Receiver<CloseKind> {
        self.closed_tx.subscribe()
    }
}
