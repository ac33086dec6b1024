//! End-to-end tests for the order sync service: in-memory transport for the
//! push path, a real WebSocket server for the reconnect path, and a mock
//! order listing for the polling fallback.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use order_sync::{
    ConnectionState, Identity, OrderListing, OrderStatus, OrderSummary, OrderSync, RawOrder, Role,
    SyncConfig, SyncResult, TransportMode, WireEvent,
};

/// Log setup shared by every test in this file; later calls are no-ops
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_sync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Order listing stub with a call counter
struct MockApi {
    calls: AtomicUsize,
    orders: Vec<RawOrder>,
}

impl MockApi {
    fn new(orders: Vec<RawOrder>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            orders,
        })
    }

    fn empty() -> Arc<Self> {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl OrderListing for MockApi {
    async fn list_orders(
        &self,
        _identity: &Identity,
        _page: u32,
        _limit: u32,
    ) -> SyncResult<Vec<RawOrder>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.orders.clone())
    }
}

fn fast_reconnect() -> order_sync::ReconnectPolicy {
    order_sync::ReconnectPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_attempts: 5,
    }
}

/// An address nothing is listening on
async fn refused_ws_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/socket")
}

fn in_memory_sync(
    identity: Identity,
    api: Arc<dyn OrderListing>,
) -> (OrderSync, broadcast::Sender<WireEvent>, broadcast::Receiver<WireEvent>) {
    let (server_tx, _keep) = broadcast::channel(64);
    let (client_tx, _keep2) = broadcast::channel(64);
    let server_side = client_tx.subscribe();
    let sync = OrderSync::in_memory(
        SyncConfig::default(),
        identity,
        api,
        server_tx.clone(),
        client_tx,
    );
    (sync, server_tx, server_side)
}

#[tokio::test]
async fn test_push_path_delivers_normalized_updates() {
    init_tracing();
    let identity = Identity::new(Role::Customer, 42, "tok");
    let (sync, server_tx, mut server_side) = in_memory_sync(identity, MockApi::empty());

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    sync.on_status_update(move |update| {
        let _ = update_tx.send(update);
    });

    sync.start();
    sync.watch_connected().wait_for(|c| *c).await.unwrap();
    assert_eq!(sync.state(), ConnectionState::Connected);

    // Exactly one join announcement, shaped by the role
    let join = server_side.recv().await.unwrap();
    assert_eq!(join.event, "join_customer_room");
    assert_eq!(join.data["customerId"], 42);

    // Push a status update with the upstream's alternate spelling
    server_tx
        .send(WireEvent::new(
            "order_status_update",
            json!({ "orderId": 100, "status": "CANCELED", "userId": 42 }),
        ))
        .unwrap();

    let update = update_rx.recv().await.unwrap();
    assert_eq!(update.order_id, 100);
    assert_eq!(update.status, OrderStatus::Cancelled);

    // The update was merged into the local order list
    let orders = sync.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Cancelled);

    sync.shutdown().await;
}

#[tokio::test]
async fn test_manual_shutdown_never_reconnects() {
    init_tracing();
    let identity = Identity::new(Role::Vendor, 7, "tok");
    let (sync, _server_tx, mut server_side) = in_memory_sync(identity, MockApi::empty());

    sync.start();
    sync.watch_connected().wait_for(|c| *c).await.unwrap();
    let _join = server_side.recv().await.unwrap();

    sync.shutdown().await;
    assert!(!sync.is_connected());
    assert_eq!(sync.state(), ConnectionState::Disconnected);

    // No reconnect happens after a manual close: no second join appears
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sync.state(), ConnectionState::Disconnected);
    assert!(server_side.try_recv().is_err());
}

#[tokio::test]
async fn test_backoff_exhaustion_reaches_failed_state() {
    init_tracing();
    let config = SyncConfig::new(refused_ws_url().await, "http://localhost:0/api")
        .with_reconnect(fast_reconnect());
    let identity = Identity::new(Role::Customer, 42, "tok");
    let sync = OrderSync::with_parts(
        config.clone(),
        identity,
        MockApi::empty(),
        TransportMode::WebSocket {
            url: config.ws_url.clone(),
        },
    );

    sync.start();

    let mut state = sync.watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Failed)
        .await
        .unwrap();

    let error = sync.connection_error().expect("terminal error expected");
    assert!(error.contains("exhausted"));
    assert!(!sync.is_connected());

    sync.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_mid_backoff_stops_reconnects() {
    init_tracing();
    let policy = order_sync::ReconnectPolicy {
        base_delay: Duration::from_millis(300),
        max_delay: Duration::from_secs(1),
        max_attempts: 5,
    };
    let config =
        SyncConfig::new(refused_ws_url().await, "http://localhost:0/api").with_reconnect(policy);
    let identity = Identity::new(Role::Staff, 3, "tok");
    let sync = OrderSync::with_parts(
        config.clone(),
        identity,
        MockApi::empty(),
        TransportMode::WebSocket {
            url: config.ws_url.clone(),
        },
    );

    sync.start();

    let mut state = sync.watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Reconnecting)
        .await
        .unwrap();

    // Consumer unmounts while a reconnect timer is pending
    sync.shutdown().await;

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(sync.state(), ConnectionState::Disconnected);
    assert!(sync.connection_error().is_some()); // the transient error persists
}

#[tokio::test]
async fn test_abnormal_close_reconnects_and_rejoins() {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (join_tx, mut join_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        // Session 1: accept, consume the join, push one event, drop the
        // socket to force an abnormal closure
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = join_tx.send(text.to_string());
        }
        let frame = json!({
            "event": "order_status_update",
            "data": { "orderId": 100, "status": "SHIPPING", "userId": 42 },
        });
        ws.send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
        drop(ws);

        // Session 2: the client reconnects and joins again
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = join_tx.send(text.to_string());
        }
        while let Some(msg) = ws.next().await {
            if msg.is_err() {
                break;
            }
        }
    });

    let config = SyncConfig::new(format!("ws://{addr}/socket"), "http://localhost:0/api")
        .with_reconnect(fast_reconnect());
    let identity = Identity::new(Role::Customer, 42, "tok");
    let sync = OrderSync::with_parts(
        config.clone(),
        identity,
        MockApi::empty(),
        TransportMode::WebSocket {
            url: config.ws_url.clone(),
        },
    );

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    sync.on_status_update(move |update| {
        let _ = update_tx.send(update);
    });

    sync.start();

    let join1 = join_rx.recv().await.unwrap();
    assert!(join1.contains("join_customer_room"));

    let update = update_rx.recv().await.unwrap();
    assert_eq!(update.order_id, 100);
    assert_eq!(update.status, OrderStatus::Shipping);

    // Server dropped the socket; the client backs off and rejoins
    let join2 = join_rx.recv().await.unwrap();
    assert!(join2.contains("join_customer_room"));
    sync.watch_connected().wait_for(|c| *c).await.unwrap();

    sync.shutdown().await;
}

#[tokio::test]
async fn test_instantly_dropped_session_still_reconnects() {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (join_tx, mut join_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        // Session 1: complete the upgrade, then drop the socket without
        // reading anything
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // Session 2: healthy
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = join_tx.send(text.to_string());
        }
        while let Some(msg) = ws.next().await {
            if msg.is_err() {
                break;
            }
        }
    });

    let config = SyncConfig::new(format!("ws://{addr}/socket"), "http://localhost:0/api")
        .with_reconnect(fast_reconnect());
    let identity = Identity::new(Role::Customer, 42, "tok");
    let sync = OrderSync::with_parts(
        config.clone(),
        identity,
        MockApi::empty(),
        TransportMode::WebSocket {
            url: config.ws_url.clone(),
        },
    );

    sync.start();

    // An immediately-dead first session reads as an abnormal drop and the
    // client retries; it must never park in Idle as if the identity were
    // invalid
    let join = join_rx.recv().await.unwrap();
    assert!(join.contains("join_customer_room"));
    sync.watch_state()
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    assert!(sync.is_connected());

    sync.shutdown().await;
}

#[tokio::test]
async fn test_polling_fallback_refreshes_while_disconnected() {
    init_tracing();
    let api = MockApi::new(vec![RawOrder {
        order_id: 1,
        status: Some("SHIPPING".to_string()),
        updated_at: None,
    }]);

    let config = SyncConfig::new(refused_ws_url().await, "http://localhost:0/api")
        .with_reconnect(fast_reconnect())
        .with_poll_interval(Duration::from_millis(20));
    let identity = Identity::new(Role::Customer, 42, "tok");
    let sync = OrderSync::with_parts(
        config.clone(),
        identity,
        api.clone(),
        TransportMode::WebSocket {
            url: config.ws_url.clone(),
        },
    );

    // Seeded by an upstream initial fetch; push channel never connects
    sync.seed_orders(&[OrderSummary {
        order_id: 1,
        status: OrderStatus::New,
        updated_at: None,
    }]);

    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    sync.on_refresh(move |orders| {
        let _ = refresh_tx.send(orders);
    });

    sync.start();

    let refreshed = refresh_rx.recv().await.unwrap();
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].status, OrderStatus::Shipping);
    assert_eq!(sync.orders()[0].status, OrderStatus::Shipping);

    // Once local state matches, identical ticks stay silent
    let quiet = tokio::time::timeout(Duration::from_millis(200), refresh_rx.recv()).await;
    assert!(quiet.is_err());
    assert!(api.calls.load(Ordering::SeqCst) >= 2);

    sync.shutdown().await;
}

#[tokio::test]
async fn test_empty_snapshot_keeps_poller_dormant() {
    init_tracing();
    let api = MockApi::new(vec![RawOrder {
        order_id: 1,
        status: Some("NEW".to_string()),
        updated_at: None,
    }]);

    let config = SyncConfig::new(refused_ws_url().await, "http://localhost:0/api")
        .with_reconnect(fast_reconnect())
        .with_poll_interval(Duration::from_millis(20));
    let identity = Identity::new(Role::Customer, 42, "tok");
    let sync = OrderSync::with_parts(
        config.clone(),
        identity,
        api.clone(),
        TransportMode::WebSocket {
            url: config.ws_url.clone(),
        },
    );

    sync.start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Nothing to keep fresh, so the collaborator is never queried
    assert_eq!(api.calls.load(Ordering::SeqCst), 0);

    sync.shutdown().await;
}
