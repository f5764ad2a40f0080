//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use rust_decimal::Decimal;

use mercado_core::{CurrencyCode, Price};

/// Format an amount in reais, e.g. `R$ 1.234,56`.
///
/// Usage in templates: `{{ product.price|money }}`
#[askama::filter_fn]
pub fn money(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format_money(value))
}

/// Anything that does not parse as a decimal is passed through unchanged.
fn format_money(value: impl Display) -> String {
    let raw = value.to_string();
    raw.parse::<Decimal>()
        .map_or(raw, |amount| Price::new(amount).display(CurrencyCode::BRL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(Price::from_cents(123_456)), "R$ 1.234,56");
        assert_eq!(format_money(Price::ZERO), "R$ 0,00");
        assert_eq!(format_money("n/a"), "n/a");
    }
}
