//! Return window and refund proration.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::types::{OrderStatus, Price};

/// Days after delivery during which a return can be requested.
pub const RETURN_WINDOW_DAYS: i64 = 30;

/// Whether a return opened at `now` falls inside the window.
#[must_use]
pub fn within_return_window(delivered_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now <= delivered_at + Duration::days(RETURN_WINDOW_DAYS)
}

/// A returned quantity of one order line, at its purchase price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnedLine {
    pub unit_price: Price,
    pub quantity: u32,
}

/// Refund owed for `items`.
///
/// The gross value of the items is scaled by the share of the order subtotal
/// the customer actually paid, so coupon and points discounts are not
/// refunded twice. `order_discount` is the sum of both discounts.
#[must_use]
pub fn refund_for_items(items: &[ReturnedLine], order_subtotal: Price, order_discount: Price) -> Price {
    let gross: Price = items.iter().map(|i| i.unit_price.times(i.quantity)).sum();
    if order_subtotal.is_zero() {
        return Price::ZERO;
    }

    let paid = order_subtotal.saturating_sub(order_discount);
    let ratio = paid.amount() / order_subtotal.amount();
    gross.scale(ratio).min(paid)
}

/// Loyalty points to take back when `refunded` of `merchandise_value` is
/// returned. Proportional and rounded down; never more than was earned.
#[must_use]
pub fn points_to_revert(points_earned: i64, refunded: Price, merchandise_value: Price) -> i64 {
    if points_earned <= 0 || merchandise_value.is_zero() || refunded.is_zero() {
        return 0;
    }
    let share = (refunded.amount() / merchandise_value.amount()).min(Decimal::ONE);
    (Decimal::from(points_earned) * share)
        .floor()
        .to_i64()
        .unwrap_or(0)
        .clamp(0, points_earned)
}

/// Order status after a return completes.
#[must_use]
pub const fn order_status_after_return(fully_returned: bool) -> OrderStatus {
    if fully_returned {
        OrderStatus::Refunded
    } else {
        OrderStatus::PartiallyRefunded
    }
}

/// Errors when choosing quantities for a return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReturnQuantityError {
    #[error("return must include at least one item")]
    Empty,
    #[error("quantity must be positive")]
    ZeroQuantity,
    #[error("cannot return {requested} units; only {available} remain returnable")]
    ExceedsReturnable { requested: u32, available: u32 },
}

/// Check a requested return quantity against what is still returnable.
///
/// # Errors
///
/// Zero quantities and quantities above `purchased - already_returned` fail.
pub fn check_return_quantity(
    requested: u32,
    purchased: u32,
    already_returned: u32,
) -> Result<(), ReturnQuantityError> {
    if requested == 0 {
        return Err(ReturnQuantityError::ZeroQuantity);
    }
    let available = purchased.saturating_sub(already_returned);
    if requested > available {
        return Err(ReturnQuantityError::ExceedsReturnable {
            requested,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn price(s: &str) -> Price {
        Price::new(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_return_window() {
        let delivered = Utc::now() - Duration::days(10);
        assert!(within_return_window(delivered, Utc::now()));
        assert!(within_return_window(delivered, delivered + Duration::days(30)));
        assert!(!within_return_window(
            delivered,
            delivered + Duration::days(30) + Duration::seconds(1)
        ));
    }

    #[test]
    fn test_refund_without_discount() {
        let items = [ReturnedLine {
            unit_price: price("59.90"),
            quantity: 2,
        }];
        assert_eq!(
            refund_for_items(&items, price("200.00"), Price::ZERO),
            price("119.80")
        );
    }

    #[test]
    fn test_refund_prorated_by_discount() {
        // 25% off the whole order
        let items = [ReturnedLine {
            unit_price: price("40.00"),
            quantity: 1,
        }];
        assert_eq!(
            refund_for_items(&items, price("160.00"), price("40.00")),
            price("30.00")
        );
    }

    #[test]
    fn test_refund_rounds_to_cents() {
        let items = [ReturnedLine {
            unit_price: price("10.00"),
            quantity: 1,
        }];
        // ratio 2/3
        assert_eq!(
            refund_for_items(&items, price("30.00"), price("10.00")),
            price("6.67")
        );
    }

    #[test]
    fn test_points_to_revert() {
        assert_eq!(points_to_revert(300, price("50.00"), price("150.00")), 100);
        assert_eq!(points_to_revert(100, price("10.00"), price("30.00")), 33);
        assert_eq!(points_to_revert(100, price("999"), price("30.00")), 100);
        assert_eq!(points_to_revert(0, price("10"), price("30")), 0);
    }

    #[test]
    fn test_status_after_return() {
        assert_eq!(order_status_after_return(true), OrderStatus::Refunded);
        assert_eq!(
            order_status_after_return(false),
            OrderStatus::PartiallyRefunded
        );
    }

    #[test]
    fn test_check_return_quantity() {
        assert!(check_return_quantity(2, 3, 1).is_ok());
        assert_eq!(
            check_return_quantity(3, 3, 1),
            Err(ReturnQuantityError::ExceedsReturnable {
                requested: 3,
                available: 2
            })
        );
        assert_eq!(
            check_return_quantity(0, 3, 0),
            Err(ReturnQuantityError::ZeroQuantity)
        );
    }
}
