//! Transport abstraction for the push channel.
//!
//! One bidirectional event stream carrying [`WireEvent`] frames. The real
//! transport is a WebSocket connection authenticated with a bearer token at
//! upgrade time; [`MemoryTransport`] provides the same contract over
//! broadcast channels for in-process tests.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{SyncError, SyncResult};
use crate::event::WireEvent;

/// Close reason sent on a caller-initiated disconnect. The reconnect loop
/// treats this closure as terminal.
pub const MANUAL_DISCONNECT_REASON: &str = "Manual disconnect";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport abstraction for the order event stream
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn read_event(&self) -> SyncResult<WireEvent>;
    async fn write_event(&self, event: &WireEvent) -> SyncResult<()>;
    async fn close(&self) -> SyncResult<()>;
}

/// WebSocket transport implementation
#[derive(Debug, Clone)]
pub struct WsTransport {
    reader: Arc<Mutex<SplitStream<WsStream>>>,
    writer: Arc<Mutex<SplitSink<WsStream, Message>>>,
}

impl WsTransport {
    /// Connect and authenticate with a bearer token on the upgrade request
    pub async fn connect(url: &str, token: &str) -> SyncResult<Self> {
        // Host header is required by the WebSocket upgrade handshake
        let host = url
            .split("://")
            .nth(1)
            .and_then(|s| s.split('/').next())
            .unwrap_or("localhost");

        let request = tungstenite::http::Request::builder()
            .uri(url)
            .header("Host", host)
            .header("Authorization", format!("Bearer {token}"))
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| SyncError::Connection(format!("failed to build WS request: {e}")))?;

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        let (writer, reader) = stream.split();

        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn read_event(&self) -> SyncResult<WireEvent> {
        let mut reader = self.reader.lock().await;

        loop {
            match reader.next().await {
                None => return Err(SyncError::Connection("socket stream ended".to_string())),
                Some(Err(e)) => return Err(SyncError::Connection(e.to_string())),
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<WireEvent>(text.as_str())
                        .map_err(|e| SyncError::InvalidMessage(format!("bad event frame: {e}")));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    return Err(SyncError::Connection(format!("socket closed: {reason}")));
                }
                // Ping/pong keepalive and binary frames carry no order events
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn write_event(&self, event: &WireEvent) -> SyncResult<()> {
        let frame = serde_json::to_string(event)?;
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))
    }

    async fn close(&self) -> SyncResult<()> {
        let mut writer = self.writer.lock().await;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: MANUAL_DISCONNECT_REASON.into(),
        };
        // The peer may already be gone; closing a dead socket is not an error
        if let Err(e) = writer.send(Message::Close(Some(frame))).await {
            tracing::debug!("close frame not delivered: {e}");
        }
        Ok(())
    }
}

/// Memory transport implementation (for in-process tests)
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    /// Receiver for events FROM the server
    rx: Arc<Mutex<broadcast::Receiver<WireEvent>>>,
    /// Sender for events TO the server
    tx: broadcast::Sender<WireEvent>,
}

impl MemoryTransport {
    /// # Arguments
    /// * `server_tx` - the server's broadcast sender (subscribed for pushes)
    /// * `client_tx` - the channel carrying events to the server
    pub fn new(server_tx: &broadcast::Sender<WireEvent>, client_tx: &broadcast::Sender<WireEvent>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(server_tx.subscribe())),
            tx: client_tx.clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_event(&self) -> SyncResult<WireEvent> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "memory transport lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SyncError::Connection("memory channel closed".to_string()));
                }
            }
        }
    }

    async fn write_event(&self, event: &WireEvent) -> SyncResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|e| SyncError::Connection(format!("failed to send to server: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Concrete transport dispatch used by the connector
#[derive(Debug, Clone)]
pub enum ClientTransport {
    Ws(WsTransport),
    Memory(MemoryTransport),
}

impl ClientTransport {
    pub async fn read_event(&self) -> SyncResult<WireEvent> {
        match self {
            ClientTransport::Ws(t) => t.read_event().await,
            ClientTransport::Memory(t) => t.read_event().await,
        }
    }

    pub async fn write_event(&self, event: &WireEvent) -> SyncResult<()> {
        match self {
            ClientTransport::Ws(t) => t.write_event(event).await,
            ClientTransport::Memory(t) => t.write_event(event).await,
        }
    }

    pub async fn close(&self) -> SyncResult<()> {
        match self {
            ClientTransport::Ws(t) => t.close().await,
            ClientTransport::Memory(t) => t.close().await,
        }
    }
}
