//! Order sync service.
//!
//! One generic component parameterized by role: owns the connector, the
//! reconnection loop, the polling fallback, the local snapshot, and the
//! dispatcher. Data flow: transport events → normalizer → snapshot merge →
//! dispatch. While the push channel is down the polling engine drives the
//! same dispatch path from HTTP fetches.
//!
//! Lifecycle: created when a consuming view mounts with a valid identity,
//! torn down with [`OrderSync::shutdown`] on unmount. Shutdown cancels the
//! polling loop, closes the transport with a manual-disconnect code so no
//! reconnect timer fires afterwards, and drops all callback registrations.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::connector::{CloseKind, Connector, TransportMode};
use crate::dispatch::{Dispatcher, Notifier, SubscriptionId};
use crate::error::SyncResult;
use crate::event::{OrderStatusUpdate, WireEvent, normalize};
use crate::identity::Identity;
use crate::orders::{HttpOrderApi, OrderListing, OrderSnapshot, OrderSummary};
use crate::poller::PollingEngine;
use crate::reconnect::{ConnectionState, ReconnectPolicy};

/// Real-time order-status synchronization for one identity
pub struct OrderSync {
    config: SyncConfig,
    identity: Identity,
    connector: Arc<Connector>,
    dispatcher: Arc<Dispatcher>,
    snapshot: Arc<Mutex<OrderSnapshot>>,
    api: Arc<dyn OrderListing>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    conn_task: Mutex<Option<JoinHandle<()>>>,
    background_started: Mutex<bool>,
}

impl OrderSync {
    /// Production wiring: WebSocket push channel plus the reqwest-backed
    /// order listing client built from the config.
    pub fn new(config: SyncConfig, identity: Identity) -> SyncResult<Self> {
        let api = Arc::new(HttpOrderApi::new(
            config.api_base_url.clone(),
            config.request_timeout,
        )?);
        let mode = TransportMode::WebSocket {
            url: config.ws_url.clone(),
        };
        Ok(Self::with_parts(config, identity, api, mode))
    }

    /// Full dependency injection; tests and embedders use this directly
    pub fn with_parts(
        config: SyncConfig,
        identity: Identity,
        api: Arc<dyn OrderListing>,
        mode: TransportMode,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            connector: Arc::new(Connector::new(mode)),
            dispatcher: Arc::new(Dispatcher::new(identity.role)),
            snapshot: Arc::new(Mutex::new(OrderSnapshot::default())),
            api,
            state_tx,
            cancel: CancellationToken::new(),
            conn_task: Mutex::new(None),
            background_started: Mutex::new(false),
            config,
            identity,
        }
    }

    /// In-process wiring over broadcast channels
    pub fn in_memory(
        config: SyncConfig,
        identity: Identity,
        api: Arc<dyn OrderListing>,
        server_tx: broadcast::Sender<WireEvent>,
        client_tx: broadcast::Sender<WireEvent>,
    ) -> Self {
        Self::with_parts(
            config,
            identity,
            api,
            TransportMode::Memory {
                server_tx,
                client_tx,
            },
        )
    }

    /// Spawn the background tasks. The event pump and the polling loop start
    /// once; the connection loop is respawned when the previous one has
    /// ended, which is the manual restart path out of the `Failed` state
    /// (the attempt counter starts over).
    pub fn start(&self) {
        {
            let mut started = self.background_started.lock().unwrap();
            if !*started {
                *started = true;

                // Subscribe here so no event between connect and the pump's
                // first poll can be missed
                tokio::spawn(event_pump(
                    self.connector.subscribe_events(),
                    self.snapshot.clone(),
                    self.dispatcher.clone(),
                    self.cancel.clone(),
                ));

                let engine = PollingEngine::new(
                    self.api.clone(),
                    self.identity.clone(),
                    self.snapshot.clone(),
                    self.config.poll_page_size,
                );
                tokio::spawn(engine.run(
                    self.config.poll_interval,
                    self.connector.watch_connected(),
                    self.dispatcher.clone(),
                    self.cancel.clone(),
                ));
            }
        }

        let mut guard = self.conn_task.lock().unwrap();
        let running = guard.as_ref().is_some_and(|h| !h.is_finished());
        if !running {
            *guard = Some(tokio::spawn(connection_loop(
                self.connector.clone(),
                self.identity.clone(),
                self.config.reconnect,
                self.state_tx.clone(),
                self.cancel.clone(),
            )));
        }
    }

    /// Tear everything down: stop the polling loop, close the transport with
    /// a manual-disconnect code, drop all callback registrations.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.connector.disconnect().await;
        self.dispatcher.clear();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!("order sync shut down");
    }

    // ===== Observable state =====

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connector.watch_connected()
    }

    pub fn connection_error(&self) -> Option<String> {
        self.connector.connection_error()
    }

    pub fn watch_connection_error(&self) -> watch::Receiver<Option<String>> {
        self.connector.watch_connection_error()
    }

    // ===== Subscriptions =====

    pub fn on_status_update(
        &self,
        callback: impl Fn(OrderStatusUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.dispatcher.on_status_update(callback)
    }

    pub fn on_new_order(
        &self,
        callback: impl Fn(OrderStatusUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.dispatcher.on_new_order(callback)
    }

    pub fn on_order_cancelled(
        &self,
        callback: impl Fn(OrderStatusUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.dispatcher.on_order_cancelled(callback)
    }

    pub fn on_refresh(
        &self,
        callback: impl Fn(Vec<OrderSummary>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.dispatcher.on_refresh(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    pub fn set_notifier(&self, notifier: Arc<dyn Notifier>) {
        self.dispatcher.set_notifier(notifier);
    }

    // ===== Orders =====

    /// Seed the local snapshot from an initial (non-push) fetch. The polling
    /// fallback stays dormant until there is something to keep fresh.
    pub fn seed_orders(&self, orders: &[OrderSummary]) {
        self.snapshot.lock().unwrap().replace_all(orders);
    }

    /// Current local order list, id-sorted
    pub fn orders(&self) -> Vec<OrderSummary> {
        self.snapshot.lock().unwrap().orders()
    }

    /// Send a raw event over the push channel. Returns whether a send was
    /// attempted (only while connected); never errors.
    pub async fn send_message(&self, event: &str, data: Value) -> bool {
        self.connector.send_message(event, data).await
    }
}

/// Reads raw transport events, normalizes them, merges into the snapshot and
/// fans out to subscribers
async fn event_pump(
    mut events: broadcast::Receiver<WireEvent>,
    snapshot: Arc<Mutex<OrderSnapshot>>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => match event {
                Ok(event) => {
                    let Some((kind, update)) = normalize(&event) else {
                        continue;
                    };
                    let changed = snapshot.lock().unwrap().apply(&update);
                    tracing::debug!(
                        order_id = update.order_id,
                        status = %update.status,
                        changed,
                        "push event applied"
                    );
                    dispatcher.dispatch(kind, &update);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

/// Connect, hold the session, reconnect with exponential backoff on
/// non-manual closure. Returns on manual disconnect, cancellation, disabled
/// identity, or after the backoff budget is exhausted.
async fn connection_loop(
    connector: Arc<Connector>,
    identity: Identity,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    // Checked here, not via the is_connected flag: a transport that dies
    // right after connect returns flips the flag back to false, and that
    // must read as an abnormal drop, never as a disabled identity
    if !identity.is_valid() {
        state_tx.send_replace(ConnectionState::Idle);
        return;
    }

    let mut failures: u32 = 0;
    state_tx.send_replace(ConnectionState::Connecting);

    loop {
        if cancel.is_cancelled() {
            return;
        }

        // Subscribe before connecting so the closure event cannot be missed
        let mut closed_rx = connector.subscribe_closed();

        match connector.connect(&identity).await {
            Ok(()) => {
                failures = 0;
                state_tx.send_replace(ConnectionState::Connected);

                let kind = tokio::select! {
                    _ = cancel.cancelled() => return,
                    kind = closed_rx.recv() => kind,
                };
                state_tx.send_replace(ConnectionState::Disconnected);

                match kind {
                    Ok(CloseKind::Manual) => {
                        tracing::info!("manual disconnect, not reconnecting");
                        return;
                    }
                    Ok(CloseKind::Abnormal(reason)) => {
                        tracing::warn!(reason, "push channel dropped");
                    }
                    Err(_) => return,
                }
            }
            Err(e) => {
                tracing::warn!("connect attempt failed: {e}");
            }
        }

        failures += 1;
        if policy.exhausted(failures) {
            connector
                .set_connection_error("reconnect attempts exhausted, manual restart required");
            state_tx.send_replace(ConnectionState::Failed);
            tracing::error!(
                attempts = failures - 1,
                "push channel failed permanently"
            );
            return;
        }

        state_tx.send_replace(ConnectionState::Reconnecting);
        let delay = policy.delay_for(failures);
        tracing::info!(
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
