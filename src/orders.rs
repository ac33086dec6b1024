//! Order listing collaborator and the local order snapshot.
//!
//! The order-listing endpoint is external to this crate; [`OrderListing`] is
//! the seam, [`HttpOrderApi`] the production implementation. The snapshot is
//! the client-side view both paths merge into: push updates overwrite by id,
//! poll refreshes replace it wholesale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SyncResult;
use crate::event::OrderStatusUpdate;
use crate::identity::Identity;
use crate::status::OrderStatus;

/// Order row as the listing endpoint returns it. Only `orderId` is
/// guaranteed; a missing status is tolerated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub order_id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Normalized order row held in the local snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_id: i64,
    pub status: OrderStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct OrdersPage {
    #[serde(default)]
    orders: Vec<RawOrder>,
}

/// External order-listing collaborator
#[async_trait]
pub trait OrderListing: Send + Sync {
    async fn list_orders(
        &self,
        identity: &Identity,
        page: u32,
        limit: u32,
    ) -> SyncResult<Vec<RawOrder>>;
}

/// reqwest-backed order listing client
pub struct HttpOrderApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl OrderListing for HttpOrderApi {
    async fn list_orders(
        &self,
        identity: &Identity,
        page: u32,
        limit: u32,
    ) -> SyncResult<Vec<RawOrder>> {
        let url = format!(
            "{}/orders/{}/{}",
            self.base_url.trim_end_matches('/'),
            identity.role.orders_path_segment(),
            identity.id
        );

        let body: OrdersPage = self
            .client
            .get(&url)
            .query(&[("page", page), ("limit", limit)])
            .bearer_auth(&identity.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body.orders)
    }
}

/// Client-side snapshot of the identity's order list.
///
/// Keyed by order id so both merge strategies are cheap: push-path
/// overwrite-by-id and poll-path wholesale replace.
#[derive(Debug, Default)]
pub struct OrderSnapshot {
    orders: BTreeMap<i64, OrderSummary>,
}

impl OrderSnapshot {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn status_of(&self, order_id: i64) -> Option<&OrderStatus> {
        self.orders.get(&order_id).map(|o| &o.status)
    }

    /// Merge one push-path update. Overwrite-by-id, so applying the same
    /// update twice is a no-op. Returns whether anything changed.
    pub fn apply(&mut self, update: &OrderStatusUpdate) -> bool {
        match self.orders.get_mut(&update.order_id) {
            Some(existing) if existing.status == update.status => false,
            Some(existing) => {
                existing.status = update.status.clone();
                existing.updated_at = Some(update.timestamp);
                true
            }
            None => {
                self.orders.insert(
                    update.order_id,
                    OrderSummary {
                        order_id: update.order_id,
                        status: update.status.clone(),
                        updated_at: Some(update.timestamp),
                    },
                );
                true
            }
        }
    }

    /// Poll-path wholesale replace
    pub fn replace_all(&mut self, orders: &[OrderSummary]) {
        self.orders = orders
            .iter()
            .cloned()
            .map(|o| (o.order_id, o))
            .collect();
    }

    /// Sorted (id, status-token) pairs; the poll path compares these to
    /// decide whether anything changed
    pub fn signature(&self) -> Vec<(i64, String)> {
        self.orders
            .values()
            .map(|o| (o.order_id, o.status.as_token().to_string()))
            .collect()
    }

    /// Current order list, id-sorted
    pub fn orders(&self) -> Vec<OrderSummary> {
        self.orders.values().cloned().collect()
    }
}
