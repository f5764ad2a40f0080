//! Loyalty tiers, point accrual and redemption.
//!
//! Tiers are decided by *lifetime* points (everything ever earned), so
//! spending points never demotes a customer. The spendable balance is tracked
//! separately.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::types::Price;

/// Points per whole currency unit when redeeming (100 points = 1.00).
pub const POINTS_PER_UNIT: i64 = 100;

/// Share of the post-coupon subtotal that points may pay for, in percent.
pub const MAX_REDEEM_PERCENT: i64 = 50;

/// Loyalty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyTier {
    /// All tiers, lowest first.
    pub const ALL: [Self; 4] = [Self::Bronze, Self::Silver, Self::Gold, Self::Platinum];

    /// Lifetime points needed to reach this tier.
    #[must_use]
    pub const fn threshold(self) -> i64 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 1_000,
            Self::Gold => 5_000,
            Self::Platinum => 10_000,
        }
    }

    /// Earn multiplier applied to purchases.
    #[must_use]
    pub fn multiplier(self) -> Decimal {
        match self {
            Self::Bronze => Decimal::ONE,
            Self::Silver => Decimal::new(125, 2),
            Self::Gold => Decimal::new(150, 2),
            Self::Platinum => Decimal::TWO,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
        }
    }

    /// Highest tier whose threshold is at or below `lifetime_points`.
    #[must_use]
    pub fn for_points(lifetime_points: i64) -> Self {
        Self::ALL
            .into_iter()
            .rev()
            .find(|tier| lifetime_points >= tier.threshold())
            .unwrap_or(Self::Bronze)
    }

    /// The tier above this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Bronze => Some(Self::Silver),
            Self::Silver => Some(Self::Gold),
            Self::Gold => Some(Self::Platinum),
            Self::Platinum => None,
        }
    }
}

impl std::fmt::Display for LoyaltyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the public tier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TierInfo {
    pub tier: LoyaltyTier,
    pub threshold: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "1.25"))]
    pub multiplier: Decimal,
}

/// The static tier table, lowest first.
#[must_use]
pub fn tier_table() -> Vec<TierInfo> {
    LoyaltyTier::ALL
        .into_iter()
        .map(|tier| TierInfo {
            tier,
            threshold: tier.threshold(),
            multiplier: tier.multiplier(),
        })
        .collect()
}

/// Lifetime points still missing for the next tier; `None` at the top.
#[must_use]
pub fn points_to_next_tier(lifetime_points: i64) -> Option<i64> {
    LoyaltyTier::for_points(lifetime_points)
        .next()
        .map(|next| next.threshold() - lifetime_points.max(0))
}

/// Points earned for a purchase: `floor(floor(amount) * multiplier)`.
///
/// `amount` is the paid merchandise value, shipping excluded.
#[must_use]
pub fn points_for_purchase(amount: Price, tier: LoyaltyTier) -> i64 {
    let units = amount.whole_units();
    if units <= 0 {
        return 0;
    }
    (Decimal::from(units) * tier.multiplier())
        .floor()
        .to_i64()
        .unwrap_or(0)
}

/// Currency value of a number of points.
#[must_use]
pub fn points_value(points: i64) -> Price {
    // 100 points = 1.00, so one point is one cent.
    Price::from_cents(points.max(0))
}

/// Errors when redeeming points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedemptionError {
    #[error("points to redeem cannot be negative")]
    Negative,
    #[error("insufficient loyalty points: requested {requested}, available {balance}")]
    InsufficientBalance { requested: i64, balance: i64 },
}

/// Result of planning a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Redemption {
    /// Points actually debited.
    pub points: i64,
    /// Discount those points buy.
    pub value: Price,
}

/// Largest number of points redeemable against `subtotal_after_coupon`.
///
/// Always a whole multiple of [`POINTS_PER_UNIT`].
#[must_use]
pub fn max_redeemable_points(subtotal_after_coupon: Price) -> i64 {
    let cap = subtotal_after_coupon.percent(Decimal::from(MAX_REDEEM_PERCENT));
    cap.whole_units().saturating_mul(POINTS_PER_UNIT)
}

/// Decide how many of the requested points are spent.
///
/// # Errors
///
/// Rejects negative requests and requests above the customer's balance.
/// Requests above the 50% cap are clamped rather than rejected.
pub fn plan_redemption(
    requested: i64,
    balance: i64,
    subtotal_after_coupon: Price,
) -> Result<Redemption, RedemptionError> {
    if requested < 0 {
        return Err(RedemptionError::Negative);
    }
    if requested > balance {
        return Err(RedemptionError::InsufficientBalance { requested, balance });
    }

    let points = requested.min(max_redeemable_points(subtotal_after_coupon));
    Ok(Redemption {
        points,
        value: points_value(points),
    })
}

/// Balance and tier position for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoyaltySummary {
    pub balance: i64,
    pub lifetime_points: i64,
    pub tier: LoyaltyTier,
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "1.25"))]
    pub multiplier: Decimal,
    pub next_tier: Option<LoyaltyTier>,
    pub points_to_next_tier: Option<i64>,
    /// What the balance is worth at checkout.
    pub balance_value: Price,
}

impl LoyaltySummary {
    #[must_use]
    pub fn new(balance: i64, lifetime_points: i64) -> Self {
        let tier = LoyaltyTier::for_points(lifetime_points);
        Self {
            balance,
            lifetime_points,
            tier,
            multiplier: tier.multiplier(),
            next_tier: tier.next(),
            points_to_next_tier: points_to_next_tier(lifetime_points),
            balance_value: points_value(balance),
        }
    }
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
    fn test_tier_thresholds() {
        assert_eq!(LoyaltyTier::for_points(0), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(999), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(1_000), LoyaltyTier::Silver);
        assert_eq!(LoyaltyTier::for_points(4_999), LoyaltyTier::Silver);
        assert_eq!(LoyaltyTier::for_points(5_000), LoyaltyTier::Gold);
        assert_eq!(LoyaltyTier::for_points(10_000), LoyaltyTier::Platinum);
        assert_eq!(LoyaltyTier::for_points(250_000), LoyaltyTier::Platinum);
        assert_eq!(LoyaltyTier::for_points(-5), LoyaltyTier::Bronze);
    }

    #[test]
    fn test_points_to_next_tier() {
        assert_eq!(points_to_next_tier(0), Some(1_000));
        assert_eq!(points_to_next_tier(1_200), Some(3_800));
        assert_eq!(points_to_next_tier(9_999), Some(1));
        assert_eq!(points_to_next_tier(10_000), None);
    }

    #[test]
    fn test_points_for_purchase_floors_twice() {
        // floor(199.99) = 199, 199 * 1.25 = 248.75 -> 248
        assert_eq!(points_for_purchase(price("199.99"), LoyaltyTier::Silver), 248);
        assert_eq!(points_for_purchase(price("199.99"), LoyaltyTier::Bronze), 199);
        assert_eq!(points_for_purchase(price("33.50"), LoyaltyTier::Gold), 49);
        assert_eq!(points_for_purchase(price("100"), LoyaltyTier::Platinum), 200);
    }

    #[test]
    fn test_points_for_purchase_below_one_unit() {
        assert_eq!(points_for_purchase(price("0.99"), LoyaltyTier::Platinum), 0);
        assert_eq!(points_for_purchase(Price::ZERO, LoyaltyTier::Bronze), 0);
    }

    #[test]
    fn test_redemption_within_cap() {
        let plan = plan_redemption(500, 800, price("100.00")).unwrap();
        assert_eq!(plan.points, 500);
        assert_eq!(plan.value, price("5.00"));
    }

    #[test]
    fn test_redemption_clamped_to_half_of_subtotal() {
        // Cap is 50% of 57.30 = 28.65 -> 28 whole units -> 2800 points
        let plan = plan_redemption(10_000, 20_000, price("57.30")).unwrap();
        assert_eq!(plan.points, 2_800);
        assert_eq!(plan.value, price("28.00"));
    }

    #[test]
    fn test_redemption_above_balance_rejected() {
        assert_eq!(
            plan_redemption(1_001, 1_000, price("500")),
            Err(RedemptionError::InsufficientBalance {
                requested: 1_001,
                balance: 1_000
            })
        );
        assert_eq!(
            plan_redemption(-1, 1_000, price("500")),
            Err(RedemptionError::Negative)
        );
    }

    #[test]
    fn test_redemption_zero_request() {
        assert_eq!(
            plan_redemption(0, 0, price("10")).unwrap(),
            Redemption::default()
        );
    }

    #[test]
    fn test_summary() {
        let summary = LoyaltySummary::new(350, 1_500);
        assert_eq!(summary.tier, LoyaltyTier::Silver);
        assert_eq!(summary.next_tier, Some(LoyaltyTier::Gold));
        assert_eq!(summary.points_to_next_tier, Some(3_500));
        assert_eq!(summary.balance_value, price("3.50"));
    }

    #[test]
    fn test_tier_table_is_ascending() {
        let table = tier_table();
        assert_eq!(table.len(), 4);
        assert!(table.windows(2).all(|w| w[0].threshold < w[1].threshold));
    }
}
