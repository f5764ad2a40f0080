//! Coupon validation and discount calculation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Price;

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "coupon_kind", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// `value` is a percentage of the subtotal.
    Percentage,
    /// `value` is a fixed amount off.
    Fixed,
}

/// Reasons a coupon cannot be applied, in the order they are checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponError {
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageExhausted,
    #[error("order subtotal must be at least {minimum} to use this coupon")]
    BelowMinimum { minimum: Price },
}

/// Errors in a coupon definition (admin create/update).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponDefinitionError {
    #[error("coupon code cannot be empty")]
    EmptyCode,
    #[error("coupon code may only contain letters, digits, '-' and '_'")]
    InvalidCode,
    #[error("percentage must be greater than 0 and at most 100")]
    PercentageOutOfRange,
    #[error("fixed discount must be greater than zero")]
    NonPositiveAmount,
    #[error("amounts cannot exceed {}", Price::MAX)]
    AmountTooLarge,
    #[error("maximum discount must be greater than zero")]
    NonPositiveMaxDiscount,
    #[error("expiry must be after start")]
    InvertedWindow,
    #[error("usage limit must be positive")]
    NonPositiveUsageLimit,
}

/// Normalize a coupon code: trim and upper-case.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Maximum length of a coupon code.
pub const MAX_CODE_LENGTH: usize = 32;

/// Validate a normalized coupon code.
///
/// # Errors
///
/// Returns an error for empty codes or codes with characters other than
/// ASCII letters, digits, `-` and `_`.
pub fn validate_code(code: &str) -> Result<(), CouponDefinitionError> {
    if code.is_empty() {
        return Err(CouponDefinitionError::EmptyCode);
    }
    if code.len() > MAX_CODE_LENGTH
        || !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CouponDefinitionError::InvalidCode);
    }
    Ok(())
}

/// The rule part of a coupon, independent of storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponRule {
    pub kind: CouponKind,
    pub value: Decimal,
    pub min_order_amount: Option<Price>,
    pub max_discount: Option<Price>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub active: bool,
}

impl CouponRule {
    /// Check that the rule itself is well formed.
    ///
    /// # Errors
    ///
    /// Returns the first problem with the definition.
    pub fn check_definition(&self) -> Result<(), CouponDefinitionError> {
        match self.kind {
            CouponKind::Percentage => {
                if self.value <= Decimal::ZERO || self.value > Decimal::ONE_HUNDRED {
                    return Err(CouponDefinitionError::PercentageOutOfRange);
                }
            }
            CouponKind::Fixed => {
                if self.value <= Decimal::ZERO {
                    return Err(CouponDefinitionError::NonPositiveAmount);
                }
                if self.value > Price::MAX.amount() {
                    return Err(CouponDefinitionError::AmountTooLarge);
                }
            }
        }

        let amounts = [self.min_order_amount, self.max_discount];
        if amounts.iter().flatten().any(|amount| !amount.is_storable()) {
            return Err(CouponDefinitionError::AmountTooLarge);
        }
        if self.max_discount.is_some_and(Price::is_zero) {
            return Err(CouponDefinitionError::NonPositiveMaxDiscount);
        }

        if let (Some(start), Some(end)) = (self.starts_at, self.expires_at)
            && end <= start
        {
            return Err(CouponDefinitionError::InvertedWindow);
        }

        if self.usage_limit.is_some_and(|limit| limit <= 0) {
            return Err(CouponDefinitionError::NonPositiveUsageLimit);
        }

        Ok(())
    }

    /// Whether the coupon can be applied to `subtotal` at `now`.
    ///
    /// # Errors
    ///
    /// Checks, in order: inactive, not started, expired, usage exhausted,
    /// below minimum order amount.
    pub fn validate(&self, subtotal: Price, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.active {
            return Err(CouponError::Inactive);
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Err(CouponError::NotStarted);
        }
        if self.expires_at.is_some_and(|end| now >= end) {
            return Err(CouponError::Expired);
        }
        if self
            .usage_limit
            .is_some_and(|limit| self.used_count >= limit)
        {
            return Err(CouponError::UsageExhausted);
        }
        if let Some(minimum) = self.min_order_amount
            && subtotal < minimum
        {
            return Err(CouponError::BelowMinimum { minimum });
        }
        Ok(())
    }

    /// Discount this coupon gives on `subtotal`. Never exceeds the subtotal.
    #[must_use]
    pub fn discount_for(&self, subtotal: Price) -> Price {
        let raw = match self.kind {
            CouponKind::Percentage => {
                let pct = subtotal.percent(self.value);
                self.max_discount.map_or(pct, |cap| pct.min(cap))
            }
            CouponKind::Fixed => Price::new(self.value),
        };
        raw.min(subtotal)
    }

    /// Validate then compute the discount.
    ///
    /// # Errors
    ///
    /// See [`CouponRule::validate`].
    pub fn apply(&self, subtotal: Price, now: DateTime<Utc>) -> Result<Price, CouponError> {
        self.validate(subtotal, now)?;
        Ok(self.discount_for(subtotal))
    }

    /// Uses left before the limit, `None` when unlimited.
    #[must_use]
    pub fn remaining_uses(&self) -> Option<i32> {
        self.usage_limit
            .map(|limit| (limit - self.used_count).max(0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use chrono::Duration;

    use super::*;

    fn price(s: &str) -> Price {
        Price::new(Decimal::from_str(s).unwrap())
    }

    fn percentage(value: i64) -> CouponRule {
        CouponRule {
            kind: CouponKind::Percentage,
            value: Decimal::from(value),
            min_order_amount: None,
            max_discount: None,
            starts_at: None,
            expires_at: None,
            usage_limit: None,
            used_count: 0,
            active: true,
        }
    }

    fn fixed(value: &str) -> CouponRule {
        CouponRule {
            kind: CouponKind::Fixed,
            value: Decimal::from_str(value).unwrap(),
            ..percentage(1)
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  welcome10 "), "WELCOME10");
        assert!(validate_code("WELCOME-10").is_ok());
        assert_eq!(validate_code(""), Err(CouponDefinitionError::EmptyCode));
        assert_eq!(
            validate_code("NO SPACES"),
            Err(CouponDefinitionError::InvalidCode)
        );
    }

    #[test]
    fn test_percentage_discount() {
        assert_eq!(percentage(10).discount_for(price("250.00")), price("25.00"));
        assert_eq!(percentage(15).discount_for(price("99.99")), price("15.00"));
    }

    #[test]
    fn test_percentage_discount_capped() {
        let rule = CouponRule {
            max_discount: Some(price("30.00")),
            ..percentage(20)
        };
        assert_eq!(rule.discount_for(price("500.00")), price("30.00"));
        assert_eq!(rule.discount_for(price("100.00")), price("20.00"));
    }

    #[test]
    fn test_discount_from_deserialized_subtotal() {
        let subtotal: Price = serde_json::from_str("\"250.00\"").unwrap();
        assert_eq!(percentage(10).discount_for(subtotal), price("25.00"));
        assert!(serde_json::from_str::<Price>("\"-50\"").is_err());
        assert_eq!(percentage(100).discount_for(Price::MAX), Price::MAX);
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        assert_eq!(fixed("50").discount_for(price("120.00")), price("50.00"));
        assert_eq!(fixed("50").discount_for(price("35.00")), price("35.00"));
    }

    #[test]
    fn test_validation_order() {
        let now = Utc::now();
        let everything_wrong = CouponRule {
            active: false,
            starts_at: Some(now + Duration::days(1)),
            expires_at: Some(now - Duration::days(1)),
            usage_limit: Some(1),
            used_count: 1,
            min_order_amount: Some(price("1000")),
            ..percentage(10)
        };
        assert_eq!(
            everything_wrong.validate(price("10"), now),
            Err(CouponError::Inactive)
        );

        let rule = CouponRule {
            active: true,
            ..everything_wrong.clone()
        };
        assert_eq!(rule.validate(price("10"), now), Err(CouponError::NotStarted));

        let rule = CouponRule {
            starts_at: None,
            ..rule
        };
        assert_eq!(rule.validate(price("10"), now), Err(CouponError::Expired));

        let rule = CouponRule {
            expires_at: None,
            ..rule
        };
        assert_eq!(
            rule.validate(price("10"), now),
            Err(CouponError::UsageExhausted)
        );

        let rule = CouponRule {
            usage_limit: None,
            ..rule
        };
        assert_eq!(
            rule.validate(price("10"), now),
            Err(CouponError::BelowMinimum {
                minimum: price("1000")
            })
        );

        assert!(rule.validate(price("1000"), now).is_ok());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let rule = CouponRule {
            expires_at: Some(now),
            ..percentage(10)
        };
        assert_eq!(rule.validate(price("10"), now), Err(CouponError::Expired));
    }

    #[test]
    fn test_check_definition() {
        assert!(percentage(100).check_definition().is_ok());
        assert_eq!(
            percentage(0).check_definition(),
            Err(CouponDefinitionError::PercentageOutOfRange)
        );
        assert_eq!(
            percentage(101).check_definition(),
            Err(CouponDefinitionError::PercentageOutOfRange)
        );
        assert_eq!(
            fixed("0").check_definition(),
            Err(CouponDefinitionError::NonPositiveAmount)
        );
        assert_eq!(
            fixed("-5").check_definition(),
            Err(CouponDefinitionError::NonPositiveAmount)
        );
        assert_eq!(
            fixed("10000000000").check_definition(),
            Err(CouponDefinitionError::AmountTooLarge)
        );
        assert_eq!(
            CouponRule {
                max_discount: Some(Price::ZERO),
                ..percentage(10)
            }
            .check_definition(),
            Err(CouponDefinitionError::NonPositiveMaxDiscount)
        );
        assert_eq!(
            CouponRule {
                min_order_amount: Some(Price::new(Decimal::MAX)),
                ..percentage(10)
            }
            .check_definition(),
            Err(CouponDefinitionError::AmountTooLarge)
        );

        let now = Utc::now();
        let inverted = CouponRule {
            starts_at: Some(now),
            expires_at: Some(now - Duration::hours(1)),
            ..percentage(10)
        };
        assert_eq!(
            inverted.check_definition(),
            Err(CouponDefinitionError::InvertedWindow)
        );
    }

    #[test]
    fn test_remaining_uses() {
        let rule = CouponRule {
            usage_limit: Some(5),
            used_count: 3,
            ..percentage(10)
        };
        assert_eq!(rule.remaining_uses(), Some(2));
        assert_eq!(percentage(10).remaining_uses(), None);
    }
}
