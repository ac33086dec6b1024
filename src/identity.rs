//! Identity and room membership.
//!
//! The server groups listeners into identity-scoped rooms so push events can
//! be targeted. Exactly one join announcement fires per connection, shaped by
//! the caller's role.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::event::WireEvent;

/// Listener role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Vendor,
    Staff,
}

impl Role {
    /// Outbound room-join event name for this role
    pub fn room_event(&self) -> &'static str {
        match self {
            Role::Customer => "join_customer_room",
            Role::Vendor => "join_vendor_room",
            Role::Staff => "join_staff_room",
        }
    }

    /// Wire field carrying the numeric id in the join payload
    pub fn id_field(&self) -> &'static str {
        match self {
            Role::Customer => "customerId",
            Role::Vendor => "vendorId",
            Role::Staff => "staffId",
        }
    }

    /// Path segment of the order-listing endpoint for this role
    pub fn orders_path_segment(&self) -> &'static str {
        match self {
            Role::Customer => "user",
            Role::Vendor => "vendor",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Customer => write!(f, "customer"),
            Role::Vendor => write!(f, "vendor"),
            Role::Staff => write!(f, "staff"),
        }
    }
}

/// Authenticated identity listening for order events.
///
/// Supplied by the session/auth collaborator; the token is opaque to this
/// crate and only forwarded as a bearer credential.
#[derive(Debug, Clone)]
pub struct Identity {
    pub role: Role,
    pub id: i64,
    pub token: String,
}

impl Identity {
    pub fn new(role: Role, id: i64, token: impl Into<String>) -> Self {
        Self {
            role,
            id,
            token: token.into(),
        }
    }

    /// A connect/join is only attempted for a positive id and a non-empty
    /// token; anything else disables the channel (caller-contract no-op).
    pub fn is_valid(&self) -> bool {
        self.id > 0 && !self.token.is_empty()
    }

    /// Build the room-join announcement for this identity
    pub fn join_event(&self) -> WireEvent {
        WireEvent::new(
            self.role.room_event(),
            json!({ (self.role.id_field()): self.id }),
        )
    }
}
