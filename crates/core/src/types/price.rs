//! Type-safe monetary amounts using decimal arithmetic.
//!
//! All amounts are in the store currency's standard unit (reais, not
//! centavos) and are kept at exactly two decimal places. Rounding happens on
//! construction, so every `Price` that reaches the database is already a
//! valid `NUMERIC(12,2)`.
//!
//! Deserialization rejects negative amounts and amounts above
//! [`Price::MAX`] instead of clamping them.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

/// Why a decimal is not an acceptable price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("amount cannot be negative")]
    Negative,
    #[error("amount cannot exceed {}", Price::MAX)]
    TooLarge,
}

/// A non-negative monetary amount with two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = String, example = "129.90"))]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount a `NUMERIC(12,2)` column holds: 9 999 999 999.99.
    pub const MAX: Self = Self(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));

    /// Result of arithmetic that left the decimal range.
    const OVERFLOW: Self = Self(Decimal::MAX);

    /// Create a price, rounding half away from zero to two decimal places.
    ///
    /// Negative inputs clamp to zero.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        if rounded.is_sign_negative() {
            Self::ZERO
        } else {
            Self(rounded)
        }
    }

    /// A price within `0..=MAX`, rounded to two places.
    ///
    /// # Errors
    ///
    /// Returns an error for negative amounts or amounts above [`Price::MAX`].
    pub fn checked(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        let price = Self::new(amount);
        if price > Self::MAX {
            return Err(PriceError::TooLarge);
        }
        Ok(price)
    }

    /// Whether this amount fits the storage column.
    #[must_use]
    pub fn is_storable(self) -> bool {
        self <= Self::MAX
    }

    /// Create a price from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self::new(Decimal::new(cents, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Whether this is exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    fn from_checked(result: Option<Decimal>) -> Self {
        result.map_or(Self::OVERFLOW, Self::new)
    }

    /// Multiply by a quantity (line total).
    ///
    /// Arithmetic here and below never panics. A result outside the decimal
    /// range becomes an amount that fails [`Price::is_storable`].
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::from_checked(self.0.checked_mul(Decimal::from(quantity)))
    }

    /// Subtract, clamping at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self::new(self.0 - other.0)
    }

    /// Take a percentage of this amount (`percent` in 0..=100).
    #[must_use]
    pub fn percent(self, percent: Decimal) -> Self {
        Self::from_checked(
            self.0
                .checked_mul(percent)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
        )
    }

    /// Scale by an arbitrary non-negative ratio.
    #[must_use]
    pub fn scale(self, ratio: Decimal) -> Self {
        Self::from_checked(self.0.checked_mul(ratio))
    }

    /// Whole currency units, rounded down.
    #[must_use]
    pub fn whole_units(self) -> i64 {
        self.0.floor().to_i64().unwrap_or(i64::MAX)
    }

    /// Format with a currency symbol, e.g. `R$ 1.234,56` for BRL.
    #[must_use]
    pub fn display(self, currency: CurrencyCode) -> String {
        let plain = format!("{:.2}", self.0);
        let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let (thousands, decimal) = currency.separators();
        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(thousands);
            }
            grouped.push(ch);
        }

        format!("{} {grouped}{decimal}{frac_part}", currency.symbol())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::from_checked(self.0.checked_add(rhs.0))
    }
}

impl AddAssign for Price {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::checked(amount).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// ISO 4217 currency codes supported for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    BRL,
    USD,
    EUR,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::BRL => "R$",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }

    /// ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BRL => "BRL",
            Self::USD => "USD",
            Self::EUR => "EUR",
        }
    }

    /// (thousands, decimal) separators.
    const fn separators(self) -> (char, char) {
        match self {
            Self::BRL | Self::EUR => ('.', ','),
            Self::USD => (',', '.'),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_new_rounds_half_away_from_zero() {
        assert_eq!(Price::new(dec("10.005")).amount(), dec("10.01"));
        assert_eq!(Price::new(dec("10.004")).amount(), dec("10.00"));
    }

    #[test]
    fn test_negative_clamps_to_zero() {
        assert_eq!(Price::new(dec("-3.50")), Price::ZERO);
        assert_eq!(
            Price::from_cents(500).saturating_sub(Price::from_cents(900)),
            Price::ZERO
        );
    }

    #[test]
    fn test_times_and_sum() {
        let lines = [Price::from_cents(1999).times(3), Price::from_cents(50).times(2)];
        let total: Price = lines.into_iter().sum();
        assert_eq!(total, Price::from_cents(6097));
    }

    #[test]
    fn test_percent() {
        assert_eq!(
            Price::from_cents(19990).percent(dec("15")),
            Price::from_cents(2999)
        );
    }

    #[test]
    fn test_whole_units() {
        assert_eq!(Price::from_cents(19999).whole_units(), 199);
    }

    #[test]
    fn test_display_brl_grouping() {
        assert_eq!(
            Price::from_cents(123_456_789).display(CurrencyCode::BRL),
            "R$ 1.234.567,89"
        );
        assert_eq!(Price::from_cents(990).display(CurrencyCode::BRL), "R$ 9,90");
        assert_eq!(
            Price::from_cents(100_000).display(CurrencyCode::USD),
            "$ 1,000.00"
        );
    }

    #[test]
    fn test_serde_as_string() {
        let price = Price::from_cents(12990);
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"129.90\"");
        assert_eq!(serde_json::from_str::<Price>("\"129.899\"").unwrap(), price);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Price>("\"-50\"").is_err());
        assert!(serde_json::from_str::<Price>("\"79228162514264337593543950335\"").is_err());
        assert!(serde_json::from_str::<Price>("\"10000000000.00\"").is_err());
        assert_eq!(
            serde_json::from_str::<Price>("\"9999999999.99\"").unwrap(),
            Price::MAX
        );
        assert_eq!(serde_json::from_str::<Price>("\"-0.00\"").unwrap(), Price::ZERO);
    }

    #[test]
    fn test_checked() {
        assert_eq!(Price::checked(dec("-0.01")), Err(PriceError::Negative));
        assert_eq!(Price::checked(dec("10000000000")), Err(PriceError::TooLarge));
        assert_eq!(Price::checked(dec("12.345")), Ok(Price::from_cents(1235)));
    }

    #[test]
    fn test_arithmetic_does_not_panic_on_overflow() {
        let huge = Price::new(Decimal::MAX);
        assert!(!huge.percent(dec("10")).is_storable());
        assert!(!huge.times(2).is_storable());
        assert!(!huge.scale(dec("3")).is_storable());
        assert!(!(huge + huge).is_storable());
        assert!(Price::MAX.times(1).is_storable());
    }
}
