//! Canonical order status enum shared by the push and poll paths.
//!
//! Upstream services disagree on the spelling of the cancelled state
//! (`CANCELLED` vs `CANCELED` vs `CANCEL`); everything entering this crate
//! goes through [`OrderStatus::parse`] so consumers only ever see the
//! canonical set. Unknown tokens are NOT coerced to a default: they pass
//! through as [`OrderStatus::Unrecognized`] so upstream contract drift stays
//! visible.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::fmt;

/// Canonical order status
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    New,
    Confirmed,
    Preparing,
    Shipping,
    Delivered,
    Cancelled,
    CancellationRequested,
    /// Unknown upstream token, preserved verbatim
    Unrecognized(String),
}

impl OrderStatus {
    /// Parse a raw status token.
    ///
    /// The aliases `CANCELED` and `CANCEL` (exact match) normalize to
    /// [`OrderStatus::Cancelled`]. Any other unknown token is passed through
    /// as [`OrderStatus::Unrecognized`] with a warning.
    pub fn parse(token: &str) -> Self {
        match token {
            "NEW" => OrderStatus::New,
            "CONFIRMED" => OrderStatus::Confirmed,
            "PREPARING" => OrderStatus::Preparing,
            "SHIPPING" => OrderStatus::Shipping,
            "DELIVERED" => OrderStatus::Delivered,
            "CANCELLED" => OrderStatus::Cancelled,
            "CANCELED" | "CANCEL" => {
                tracing::debug!(token, "normalizing cancelled-status alias");
                OrderStatus::Cancelled
            }
            "CANCELLATION_REQUESTED" => OrderStatus::CancellationRequested,
            other => {
                tracing::warn!(token = other, "unrecognized order status token");
                OrderStatus::Unrecognized(other.to_string())
            }
        }
    }

    /// The wire token for this status
    pub fn as_token(&self) -> &str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::CancellationRequested => "CANCELLATION_REQUESTED",
            OrderStatus::Unrecognized(raw) => raw,
        }
    }

    /// Whether this is one of the seven canonical values
    pub fn is_recognized(&self) -> bool {
        !matches!(self, OrderStatus::Unrecognized(_))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_token())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(OrderStatus::parse(&token))
    }
}
