//! Order totals at checkout.
//!
//! ```text
//! subtotal        = Σ unit_price × quantity
//! discount        = coupon discount on subtotal
//! points_discount = redeemed points, capped at 50% of (subtotal − discount)
//! shipping        = flat fee, or zero when (subtotal − discount − points_discount) ≥ threshold
//! total           = subtotal − discount − points_discount + shipping
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::coupon::{CouponError, CouponRule};
use crate::loyalty::{self, RedemptionError};
use crate::types::Price;

/// Flat-rate shipping with a free-shipping threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    pub flat_fee: Price,
    pub free_threshold: Price,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            flat_fee: Price::new(Decimal::new(1500, 2)),
            free_threshold: Price::new(Decimal::new(20000, 2)),
        }
    }
}

impl ShippingPolicy {
    /// Shipping charged on `merchandise_value`.
    #[must_use]
    pub fn fee_for(&self, merchandise_value: Price) -> Price {
        if merchandise_value >= self.free_threshold {
            Price::ZERO
        } else {
            self.flat_fee
        }
    }
}

/// One priced cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: Price,
    pub quantity: u32,
}

impl PricedLine {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Everything needed to price an order.
#[derive(Debug, Clone)]
pub struct PricingInput<'a> {
    pub lines: &'a [PricedLine],
    pub coupon: Option<&'a CouponRule>,
    pub points_requested: i64,
    pub points_balance: i64,
    pub shipping: ShippingPolicy,
    pub now: DateTime<Utc>,
}

/// Why an order could not be priced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("order has no items")]
    Empty,
    #[error("order total cannot exceed {}", Price::MAX)]
    TooLarge,
    #[error(transparent)]
    Coupon(#[from] CouponError),
    #[error(transparent)]
    Redemption(#[from] RedemptionError),
}

/// Computed order totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OrderTotals {
    pub subtotal: Price,
    pub discount: Price,
    pub points_redeemed: i64,
    pub points_discount: Price,
    pub shipping: Price,
    pub total: Price,
}

impl OrderTotals {
    /// Merchandise value actually paid (shipping excluded). Points are earned
    /// on this amount.
    #[must_use]
    pub fn merchandise_value(&self) -> Price {
        self.subtotal
            .saturating_sub(self.discount)
            .saturating_sub(self.points_discount)
    }
}

/// Subtotal of a set of lines.
#[must_use]
pub fn subtotal(lines: &[PricedLine]) -> Price {
    lines.iter().map(PricedLine::line_total).sum()
}

/// Price an order.
///
/// # Errors
///
/// Fails on an empty order, an inapplicable coupon, or a redemption the
/// customer's balance cannot cover.
pub fn compute_totals(input: &PricingInput<'_>) -> Result<OrderTotals, PricingError> {
    if input.lines.is_empty() || input.lines.iter().all(|l| l.quantity == 0) {
        return Err(PricingError::Empty);
    }

    let subtotal = subtotal(input.lines);
    if !subtotal.is_storable() {
        return Err(PricingError::TooLarge);
    }

    let discount = match input.coupon {
        Some(rule) => rule.apply(subtotal, input.now)?,
        None => Price::ZERO,
    };
    let after_coupon = subtotal.saturating_sub(discount);

    let redemption =
        loyalty::plan_redemption(input.points_requested, input.points_balance, after_coupon)?;
    let merchandise = after_coupon.saturating_sub(redemption.value);

    let shipping = input.shipping.fee_for(merchandise);
    let total = merchandise + shipping;
    if !total.is_storable() {
        return Err(PricingError::TooLarge);
    }

    Ok(OrderTotals {
        subtotal,
        discount,
        points_redeemed: redemption.points,
        points_discount: redemption.value,
        shipping,
        total,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::coupon::CouponKind;

    fn price(s: &str) -> Price {
        Price::new(Decimal::from_str(s).unwrap())
    }

    fn line(unit: &str, quantity: u32) -> PricedLine {
        PricedLine {
            unit_price: price(unit),
            quantity,
        }
    }

    fn input<'a>(lines: &'a [PricedLine], coupon: Option<&'a CouponRule>) -> PricingInput<'a> {
        PricingInput {
            lines,
            coupon,
            points_requested: 0,
            points_balance: 0,
            shipping: ShippingPolicy::default(),
            now: Utc::now(),
        }
    }

    fn ten_percent() -> CouponRule {
        CouponRule {
            kind: CouponKind::Percentage,
            value: Decimal::from(10),
            min_order_amount: None,
            max_discount: None,
            starts_at: None,
            expires_at: None,
            usage_limit: None,
            used_count: 0,
            active: true,
        }
    }

    #[test]
    fn test_order_above_storable_total_is_rejected() {
        let lines = [PricedLine {
            unit_price: Price::MAX,
            quantity: 2,
        }];
        assert_eq!(
            compute_totals(&input(&lines, None)),
            Err(PricingError::TooLarge)
        );
    }

    #[test]
    fn test_small_order_pays_shipping() {
        let lines = [line("49.90", 2)];
        let totals = compute_totals(&input(&lines, None)).unwrap();
        assert_eq!(totals.subtotal, price("99.80"));
        assert_eq!(totals.shipping, price("15.00"));
        assert_eq!(totals.total, price("114.80"));
    }

    #[test]
    fn test_free_shipping_at_threshold() {
        let lines = [line("100.00", 2)];
        let totals = compute_totals(&input(&lines, None)).unwrap();
        assert_eq!(totals.shipping, Price::ZERO);
        assert_eq!(totals.total, price("200.00"));
    }

    #[test]
    fn test_coupon_can_push_below_free_shipping() {
        let lines = [line("210.00", 1)];
        let coupon = ten_percent();
        let totals = compute_totals(&input(&lines, Some(&coupon))).unwrap();
        assert_eq!(totals.discount, price("21.00"));
        assert_eq!(totals.shipping, price("15.00"));
        assert_eq!(totals.total, price("204.00"));
    }

    #[test]
    fn test_points_redemption_applied_after_coupon() {
        let lines = [line("100.00", 1)];
        let coupon = ten_percent();
        let mut input = input(&lines, Some(&coupon));
        input.points_requested = 10_000;
        input.points_balance = 10_000;
        let totals = compute_totals(&input).unwrap();
        // After coupon: 90.00, cap 45.00 -> 4500 points
        assert_eq!(totals.points_redeemed, 4_500);
        assert_eq!(totals.points_discount, price("45.00"));
        assert_eq!(totals.merchandise_value(), price("45.00"));
        assert_eq!(totals.total, price("60.00"));
    }

    #[test]
    fn test_invalid_coupon_fails_pricing() {
        let lines = [line("10.00", 1)];
        let coupon = CouponRule {
            active: false,
            ..ten_percent()
        };
        assert_eq!(
            compute_totals(&input(&lines, Some(&coupon))),
            Err(PricingError::Coupon(CouponError::Inactive))
        );
    }

    #[test]
    fn test_empty_order() {
        assert_eq!(compute_totals(&input(&[], None)), Err(PricingError::Empty));
    }

    #[test]
    fn test_total_identity() {
        let lines = [line("19.99", 3), line("5.01", 7)];
        let coupon = CouponRule {
            kind: CouponKind::Fixed,
            value: Decimal::from(12),
            ..ten_percent()
        };
        let mut input = input(&lines, Some(&coupon));
        input.points_requested = 250;
        input.points_balance = 300;
        let t = compute_totals(&input).unwrap();
        assert_eq!(
            t.total,
            t.subtotal
                .saturating_sub(t.discount)
                .saturating_sub(t.points_discount)
                + t.shipping
        );
    }
}
