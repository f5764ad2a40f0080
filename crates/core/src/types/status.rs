//! Status enums for orders, payments, returns and support tickets.
//!
//! Each enum maps to a Postgres enum type of the same snake_case name (with the
//! `postgres` feature). Lifecycle rules are static lookup tables expressed as
//! `match` arms.

use serde::{Deserialize, Serialize};

/// Error returned when parsing a status from a string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

/// Implements `Display` and `FromStr` in terms of `as_str()` and `ALL`.
macro_rules! impl_str_conversions {
    ($name:ident, $kind:literal) => {
        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| ParseStatusError {
                        kind: $kind,
                        value: s.to_owned(),
                    })
            }
        }
    };
}

// =============================================================================
// Roles
// =============================================================================

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Shopper with access to their own data only.
    #[default]
    Customer,
    /// Store staff with access to catalog, orders and the console.
    Admin,
}

impl Role {
    pub const ALL: [Self; 2] = [Self::Customer, Self::Admin];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl_str_conversions!(Role, "role");

// =============================================================================
// Orders
// =============================================================================

/// Order lifecycle status.
///
/// ```text
/// pending ─▶ paid ─▶ processing ─▶ shipped ─▶ delivered ─▶ partially_refunded ─▶ refunded
///    │         │          │                        └──────────────────────────────▲
///    └─────────┴──────────┴─▶ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    PartiallyRefunded,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::Paid,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
        Self::PartiallyRefunded,
        Self::Refunded,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded",
        }
    }

    /// Human-readable label for emails and pages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Awaiting payment",
            Self::Paid => "Payment confirmed",
            Self::Processing => "Being prepared",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::PartiallyRefunded => "Partially refunded",
            Self::Refunded => "Refunded",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Processing | Self::Cancelled)
                | (Self::Processing, Self::Shipped | Self::Cancelled)
                | (Self::Shipped, Self::Delivered)
                | (Self::Delivered, Self::PartiallyRefunded | Self::Refunded)
                | (Self::PartiallyRefunded, Self::PartiallyRefunded | Self::Refunded)
        )
    }

    /// Whether the customer may still cancel (stock not yet shipped).
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        self.can_transition_to(Self::Cancelled)
    }

    /// Whether no further transitions exist.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Statuses reachable from `self`.
    #[must_use]
    pub fn next_statuses(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }
}

impl_str_conversions!(OrderStatus, "order status");

/// Payment status for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Authorized,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Authorized,
        Self::Paid,
        Self::Failed,
        Self::Refunded,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Whether the payment has reached a final state for checkout purposes.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Paid | Self::Refunded)
    }
}

impl_str_conversions!(PaymentStatus, "payment status");

// =============================================================================
// Returns
// =============================================================================

/// Return request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "return_status", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    #[default]
    Requested,
    Approved,
    Rejected,
    Completed,
}

impl ReturnStatus {
    pub const ALL: [Self; 4] = [
        Self::Requested,
        Self::Approved,
        Self::Rejected,
        Self::Completed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Approved | Self::Rejected) | (Self::Approved, Self::Completed)
        )
    }

    /// Whether the return still holds its items against the order.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Requested | Self::Approved)
    }
}

impl_str_conversions!(ReturnStatus, "return status");

/// What the customer wants back for a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "return_kind", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// Money back.
    #[default]
    Refund,
    /// Same product swapped; no money moves.
    Exchange,
}

impl ReturnKind {
    pub const ALL: [Self; 2] = [Self::Refund, Self::Exchange];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Refund => "refund",
            Self::Exchange => "exchange",
        }
    }
}

impl_str_conversions!(ReturnKind, "return kind");

// =============================================================================
// Support
// =============================================================================

/// Support ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "ticket_status", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting on staff.
    #[default]
    Open,
    /// Staff replied; waiting on the customer.
    Answered,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [Self; 4] = [Self::Open, Self::Answered, Self::Resolved, Self::Closed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Answered => "answered",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn accepts_replies(self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Status after a new message is posted.
    #[must_use]
    pub const fn after_reply(self, from_staff: bool) -> Self {
        if from_staff { Self::Answered } else { Self::Open }
    }
}

impl_str_conversions!(TicketStatus, "ticket status");

/// Support ticket priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "ticket_priority", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl TicketPriority {
    pub const ALL: [Self; 3] = [Self::Low, Self::Normal, Self::High];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl_str_conversions!(TicketPriority, "ticket priority");

// =============================================================================
// Loyalty
// =============================================================================

/// Kind of loyalty ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "loyalty_kind", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTransactionKind {
    /// Points awarded for a delivered order.
    Earn,
    /// Points spent at checkout.
    Redeem,
    /// Earned or redeemed points given back (cancellation, return).
    Revert,
    /// Manual correction by staff.
    Adjust,
}

impl LoyaltyTransactionKind {
    pub const ALL: [Self; 4] = [Self::Earn, Self::Redeem, Self::Revert, Self::Adjust];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Redeem => "redeem",
            Self::Revert => "revert",
            Self::Adjust => "adjust",
        }
    }
}

impl_str_conversions!(LoyaltyTransactionKind, "loyalty transaction kind");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_happy_path_transitions() {
        use OrderStatus::*;
        let path = [Pending, Paid, Processing, Shipped, Delivered];
        for pair in path.windows(2) {
            let [from, to] = pair else { unreachable!() };
            assert!(from.can_transition_to(*to), "{from} -> {to}");
        }
    }

    #[test]
    fn test_order_cannot_skip_or_go_back() {
        use OrderStatus::*;
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Paid));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_order_cancellable_until_shipped() {
        use OrderStatus::*;
        assert!(Pending.is_cancellable());
        assert!(Paid.is_cancellable());
        assert!(Processing.is_cancellable());
        assert!(!Shipped.is_cancellable());
        assert!(!Delivered.is_cancellable());
    }

    #[test]
    fn test_order_next_statuses() {
        assert_eq!(
            OrderStatus::Delivered.next_statuses(),
            vec![OrderStatus::PartiallyRefunded, OrderStatus::Refunded]
        );
        assert!(OrderStatus::Refunded.next_statuses().is_empty());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn test_return_transitions() {
        use ReturnStatus::*;
        assert!(Requested.can_transition_to(Approved));
        assert!(Requested.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Completed));
        assert!(!Requested.can_transition_to(Completed));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(Approved.is_open());
        assert!(!Completed.is_open());
    }

    #[test]
    fn test_ticket_reply_status() {
        assert_eq!(TicketStatus::Open.after_reply(true), TicketStatus::Answered);
        assert_eq!(TicketStatus::Answered.after_reply(false), TicketStatus::Open);
        assert!(!TicketStatus::Closed.accepts_replies());
        assert!(TicketStatus::Resolved.accepts_replies());
    }

    #[test]
    fn test_string_conversions() {
        assert_eq!(
            "partially_refunded".parse::<OrderStatus>().unwrap(),
            OrderStatus::PartiallyRefunded
        );
        assert_eq!(OrderStatus::PartiallyRefunded.to_string(), "partially_refunded");
        assert!("shipping".parse::<OrderStatus>().is_err());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_serde_matches_as_str() {
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
