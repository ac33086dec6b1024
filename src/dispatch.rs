//! Subscriber dispatch and the notification bridge.
//!
//! Explicit subscription lists, one per event kind, invoked in registration
//! order. Each consumer receives its own clone of the normalized record.
//! A last-delivered guard suppresses repeat deliveries of an identical
//! (order id, status) pair on the push path; poll-driven refreshes use their
//! own callback list and are not de-duplicated against push events.
//!
//! The optional [`Notifier`] is a toast surface: the role-specific status
//! labels are presentation only and never influence dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::event::{EventKind, OrderStatusUpdate};
use crate::identity::Role;
use crate::orders::OrderSummary;
use crate::status::OrderStatus;

/// Handle for deregistering a callback
pub type SubscriptionId = Uuid;

type UpdateCallback = Arc<dyn Fn(OrderStatusUpdate) + Send + Sync>;
type RefreshCallback = Arc<dyn Fn(Vec<OrderSummary>) + Send + Sync>;

/// User-facing notification surface (toasts). Implemented by the host app.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

#[derive(Default)]
struct DispatchInner {
    status_update: Vec<(SubscriptionId, UpdateCallback)>,
    new_order: Vec<(SubscriptionId, UpdateCallback)>,
    order_cancelled: Vec<(SubscriptionId, UpdateCallback)>,
    refresh: Vec<(SubscriptionId, RefreshCallback)>,
    /// Last status delivered per order id, for duplicate suppression
    last_delivered: HashMap<i64, OrderStatus>,
    notifier: Option<Arc<dyn Notifier>>,
}

/// Fans normalized events out to registered consumers
pub struct Dispatcher {
    role: Role,
    inner: Mutex<DispatchInner>,
}

impl Dispatcher {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            inner: Mutex::new(DispatchInner::default()),
        }
    }

    pub fn on_status_update(
        &self,
        callback: impl Fn(OrderStatusUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .status_update
            .push((id, Arc::new(callback)));
        id
    }

    pub fn on_new_order(
        &self,
        callback: impl Fn(OrderStatusUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .new_order
            .push((id, Arc::new(callback)));
        id
    }

    pub fn on_order_cancelled(
        &self,
        callback: impl Fn(OrderStatusUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .order_cancelled
            .push((id, Arc::new(callback)));
        id
    }

    /// Poll-driven wholesale refreshes land here with the full order list
    pub fn on_refresh(
        &self,
        callback: impl Fn(Vec<OrderSummary>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .refresh
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a registration. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.status_update.len()
            + inner.new_order.len()
            + inner.order_cancelled.len()
            + inner.refresh.len();
        inner.status_update.retain(|(sub, _)| *sub != id);
        inner.new_order.retain(|(sub, _)| *sub != id);
        inner.order_cancelled.retain(|(sub, _)| *sub != id);
        inner.refresh.retain(|(sub, _)| *sub != id);
        let after = inner.status_update.len()
            + inner.new_order.len()
            + inner.order_cancelled.len()
            + inner.refresh.len();
        before != after
    }

    /// Drop all registrations (consumer unmount)
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.status_update.clear();
        inner.new_order.clear();
        inner.order_cancelled.clear();
        inner.refresh.clear();
        inner.last_delivered.clear();
    }

    pub fn set_notifier(&self, notifier: Arc<dyn Notifier>) {
        self.inner.lock().unwrap().notifier = Some(notifier);
    }

    /// Deliver one normalized push event to the matching subscription list
    pub fn dispatch(&self, kind: EventKind, update: &OrderStatusUpdate) {
        let (callbacks, notifier) = {
            let mut inner = self.inner.lock().unwrap();

            if inner.last_delivered.get(&update.order_id) == Some(&update.status) {
                tracing::debug!(
                    order_id = update.order_id,
                    status = %update.status,
                    "suppressing duplicate delivery"
                );
                return;
            }
            inner
                .last_delivered
                .insert(update.order_id, update.status.clone());

            let list = match kind {
                EventKind::StatusUpdate => &inner.status_update,
                EventKind::NewOrder => &inner.new_order,
                EventKind::OrderCancelled => &inner.order_cancelled,
            };
            let callbacks: Vec<UpdateCallback> = list.iter().map(|(_, cb)| cb.clone()).collect();
            (callbacks, inner.notifier.clone())
        };

        for callback in &callbacks {
            callback(update.clone());
        }

        if let Some(notifier) = notifier {
            let title = match kind {
                EventKind::StatusUpdate => "Order update",
                EventKind::NewOrder => "New order",
                EventKind::OrderCancelled => "Order cancelled",
            };
            let body = format!(
                "Order #{}: {}",
                update.order_id,
                status_label(self.role, &update.status)
            );
            notifier.notify(title, &body);
        }
    }

    /// Deliver a poll-driven wholesale refresh
    pub fn dispatch_refresh(&self, orders: &[OrderSummary]) {
        let callbacks: Vec<RefreshCallback> = {
            let inner = self.inner.lock().unwrap();
            inner.refresh.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in &callbacks {
            callback(orders.to_vec());
        }
    }
}

/// Human-readable status label per role. Presentation only: used for the
/// notification body, never for dispatch decisions.
pub fn status_label(role: Role, status: &OrderStatus) -> &'static str {
    match role {
        Role::Customer => match status {
            OrderStatus::New => "Your order has been placed",
            OrderStatus::Confirmed => "Your order is confirmed",
            OrderStatus::Preparing => "Your order is being prepared",
            OrderStatus::Shipping => "Your order is on the way",
            OrderStatus::Delivered => "Your order has been delivered",
            OrderStatus::Cancelled => "Your order was cancelled",
            OrderStatus::CancellationRequested => "Cancellation requested",
            OrderStatus::Unrecognized(_) => "Order status updated",
        },
        Role::Vendor => match status {
            OrderStatus::New => "New order received",
            OrderStatus::Confirmed => "Order confirmed",
            OrderStatus::Preparing => "Order in preparation",
            OrderStatus::Shipping => "Order out for delivery",
            OrderStatus::Delivered => "Order delivered",
            OrderStatus::Cancelled => "Order cancelled",
            OrderStatus::CancellationRequested => "Customer requested cancellation",
            OrderStatus::Unrecognized(_) => "Order status updated",
        },
        Role::Staff => match status {
            OrderStatus::New => "Order created",
            OrderStatus::Confirmed => "Order confirmed",
            OrderStatus::Preparing => "Order preparing",
            OrderStatus::Shipping => "Order shipping",
            OrderStatus::Delivered => "Order delivered",
            OrderStatus::Cancelled => "Order cancelled",
            OrderStatus::CancellationRequested => "Cancellation requested",
            OrderStatus::Unrecognized(_) => "Order status updated",
        },
    }
}
