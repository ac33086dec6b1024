//! Wire events and the event normalizer.
//!
//! The transport carries JSON frames `{"event": <name>, "data": <object>}`.
//! Three inbound event kinds are recognized; everything else is ignored at
//! debug level. [`normalize`] maps a raw frame into the canonical
//! [`OrderStatusUpdate`] record, applying the status alias rule from
//! [`crate::status`]. Normalized records are owned values; every subscriber
//! gets its own clone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::Role;
use crate::status::OrderStatus;

/// Raw transport frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WireEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Inbound event kinds handled by the sync layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StatusUpdate,
    NewOrder,
    OrderCancelled,
}

impl EventKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            EventKind::StatusUpdate => "order_status_update",
            EventKind::NewOrder => "new_order",
            EventKind::OrderCancelled => "order_cancelled",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "order_status_update" => Some(EventKind::StatusUpdate),
            "new_order" => Some(EventKind::NewOrder),
            "order_cancelled" => Some(EventKind::OrderCancelled),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// Which room the event was scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityScope {
    Customer(i64),
    Vendor(i64),
    Staff(i64),
}

impl IdentityScope {
    pub fn id(&self) -> i64 {
        match self {
            IdentityScope::Customer(id) | IdentityScope::Vendor(id) | IdentityScope::Staff(id) => {
                *id
            }
        }
    }

    pub fn role(&self) -> Role {
        match self {
            IdentityScope::Customer(_) => Role::Customer,
            IdentityScope::Vendor(_) => Role::Vendor,
            IdentityScope::Staff(_) => Role::Staff,
        }
    }
}

/// Canonical order-status event record handed to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdate {
    pub order_id: i64,
    pub status: OrderStatus,
    /// Present on the push path when the server reports it; always absent on
    /// polling-derived updates
    pub previous_status: Option<OrderStatus>,
    /// Identity context the emitting room attached, when present
    pub scope: Option<IdentityScope>,
    /// Display/ordering only, never used for correctness
    pub timestamp: DateTime<Utc>,
    pub updated_by: Option<i64>,
    pub updated_by_label: Option<String>,
}

/// Inbound payload as upstream emits it (camelCase, everything optional)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpdatePayload {
    order_id: Option<i64>,
    status: Option<String>,
    previous_status: Option<String>,
    user_id: Option<i64>,
    vendor_id: Option<i64>,
    staff_id: Option<i64>,
    timestamp: Option<DateTime<Utc>>,
    updated_by: Option<i64>,
    updated_by_label: Option<String>,
}

/// Normalize a raw transport frame into a canonical record.
///
/// Returns `None` for event names this layer does not handle and for frames
/// missing an order id. A `new_order` without a status defaults to `NEW`, an
/// `order_cancelled` without one to `CANCELLED`; a bare `order_status_update`
/// with no status carries no information and is dropped.
pub fn normalize(event: &WireEvent) -> Option<(EventKind, OrderStatusUpdate)> {
    let Some(kind) = EventKind::from_name(&event.event) else {
        tracing::debug!(event = %event.event, "ignoring unhandled event");
        return None;
    };

    let raw: RawUpdatePayload = match serde_json::from_value(event.data.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(event = %event.event, "malformed event payload: {e}");
            return None;
        }
    };

    let Some(order_id) = raw.order_id else {
        tracing::warn!(event = %event.event, "event payload missing orderId");
        return None;
    };

    let status = match (kind, raw.status.as_deref()) {
        (_, Some(token)) => OrderStatus::parse(token),
        (EventKind::NewOrder, None) => OrderStatus::New,
        (EventKind::OrderCancelled, None) => OrderStatus::Cancelled,
        (EventKind::StatusUpdate, None) => {
            tracing::warn!(order_id, "status update without a status, dropping");
            return None;
        }
    };

    let scope = raw
        .user_id
        .map(IdentityScope::Customer)
        .or(raw.vendor_id.map(IdentityScope::Vendor))
        .or(raw.staff_id.map(IdentityScope::Staff));

    Some((
        kind,
        OrderStatusUpdate {
            order_id,
            status,
            previous_status: raw.previous_status.as_deref().map(OrderStatus::parse),
            scope,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            updated_by: raw.updated_by,
            updated_by_label: raw.updated_by_label,
        },
    ))
}
