//! Order Sync - real-time order-status synchronization for the storefront
//!
//! A push-based notification channel (WebSocket) with a polling fallback:
//! per-role room membership, bounded exponential-backoff reconnection, and
//! idempotent state merging into the client-side order list. Consumers get
//! canonical [`OrderStatusUpdate`] records regardless of which path
//! delivered the change.

pub mod config;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod identity;
pub mod orders;
pub mod reconnect;
pub mod service;
pub mod status;
pub mod transport;

mod poller;

pub use config::SyncConfig;
pub use connector::{CloseKind, Connector, TransportMode};
pub use dispatch::{Dispatcher, Notifier, SubscriptionId, status_label};
pub use error::{SyncError, SyncResult};
pub use event::{EventKind, IdentityScope, OrderStatusUpdate, WireEvent};
pub use identity::{Identity, Role};
pub use orders::{HttpOrderApi, OrderListing, OrderSnapshot, OrderSummary, RawOrder};
pub use reconnect::{ConnectionState, ReconnectPolicy};
pub use service::OrderSync;
pub use status::OrderStatus;
