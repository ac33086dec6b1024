//! Polling fallback engine.
//!
//! Drives the same dispatch path as the push channel, but from periodic HTTP
//! re-fetches. Only runs while the push channel is down and there is a local
//! snapshot to keep fresh. Change detection is coarse: the sorted
//! (id, status) signature of the fetched page is compared against the local
//! snapshot and, on any difference, the snapshot is replaced wholesale and
//! one refresh callback fires with the full list. Fetch failures are soft:
//! logged, tick skipped, loop continues.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::error::SyncResult;
use crate::identity::Identity;
use crate::orders::{OrderListing, OrderSnapshot, OrderSummary, RawOrder};
use crate::status::OrderStatus;

pub(crate) struct PollingEngine {
    api: Arc<dyn OrderListing>,
    identity: Identity,
    snapshot: Arc<Mutex<OrderSnapshot>>,
    page_size: u32,
}

impl PollingEngine {
    pub(crate) fn new(
        api: Arc<dyn OrderListing>,
        identity: Identity,
        snapshot: Arc<Mutex<OrderSnapshot>>,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            identity,
            snapshot,
            page_size,
        }
    }

    /// One poll cycle. Returns the full refreshed list when the fetched page
    /// differs from the local snapshot, `None` on a no-op tick.
    pub(crate) async fn tick(&self, push_connected: bool) -> SyncResult<Option<Vec<OrderSummary>>> {
        if push_connected {
            return Ok(None);
        }
        if !self.identity.is_valid() {
            return Ok(None);
        }
        // Nothing to keep fresh until an initial fetch seeded the snapshot
        if self.snapshot.lock().unwrap().is_empty() {
            return Ok(None);
        }

        let raw = self
            .api
            .list_orders(&self.identity, 1, self.page_size)
            .await?;

        let mut snapshot = self.snapshot.lock().unwrap();
        let fetched = normalize_page(&snapshot, &raw);

        let mut fetched_sig: Vec<(i64, String)> = fetched
            .iter()
            .map(|o| (o.order_id, o.status.as_token().to_string()))
            .collect();
        fetched_sig.sort();

        if fetched_sig == snapshot.signature() {
            return Ok(None);
        }

        snapshot.replace_all(&fetched);
        tracing::debug!(orders = fetched.len(), "poll detected order changes");
        Ok(Some(snapshot.orders()))
    }

    /// Poll loop; torn down by the cancellation token when the consumer
    /// unmounts. Connectivity is re-checked every tick so the loop goes
    /// dormant as soon as the push channel is back.
    pub(crate) async fn run(
        self,
        interval: Duration,
        connected_rx: watch::Receiver<bool>,
        dispatcher: Arc<Dispatcher>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("polling loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let connected = *connected_rx.borrow();
                    match self.tick(connected).await {
                        Ok(Some(orders)) => dispatcher.dispatch_refresh(&orders),
                        Ok(None) => {}
                        Err(e) => tracing::warn!("order poll failed, will retry: {e}"),
                    }
                }
            }
        }
    }
}

/// Normalize a fetched page against the current snapshot: statuses go
/// through the canonical parser; a row without a status keeps the locally
/// known status for that id (unchanged), or stays unrecognized when the id
/// is new.
fn normalize_page(snapshot: &OrderSnapshot, raw: &[RawOrder]) -> Vec<OrderSummary> {
    raw.iter()
        .map(|order| {
            let status = match order.status.as_deref() {
                Some(token) => OrderStatus::parse(token),
                None => snapshot
                    .status_of(order.order_id)
                    .cloned()
                    .unwrap_or_else(|| OrderStatus::Unrecognized(String::new())),
            };
            OrderSummary {
                order_id: order.order_id,
                status,
                updated_at: order.updated_at,
            }
        })
        .collect()
}
