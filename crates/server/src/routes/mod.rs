//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ## JSON API (`/api`)
//! - `/auth` - Registration, login, logout, current user, password change
//! - `/products`, `/categories` - Catalog browsing and admin management
//! - `/cart`, `/wishlist` - Per-user shopping state
//! - `/orders` - Checkout, history, cancellation, admin status changes
//! - `/addresses` - Address book and CEP lookup
//! - `/reviews`, `/coupons`, `/loyalty` - Reviews, discounts and points
//! - `/tracking`, `/returns`, `/support` - After-sales
//! - `/payments` - Checkout sessions and gateway notifications
//! - `/upload` - Product image uploads (admin)
//! - `/admin`, `/analytics` - Back-office reporting
//!
//! ## Server-rendered pages
//! - `/store` - Customer storefront
//! - `/console` - Admin console

pub mod addresses;
pub mod admin;
pub mod analytics;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod console;
pub mod coupons;
pub mod loyalty;
pub mod orders;
pub mod payments;
pub mod products;
pub mod returns;
pub mod reviews;
pub mod store;
pub mod support;
pub mod tracking;
pub mod upload;
pub mod wishlist;

use axum::Router;

use crate::error::{AppError, Result};
use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// The JSON API, mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router().layer(auth_rate_limiter()))
        .nest("/products", products::router())
        .nest("/categories", categories::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/addresses", addresses::router())
        .nest("/reviews", reviews::router())
        .nest("/coupons", coupons::router())
        .nest("/wishlist", wishlist::router())
        .nest("/support", support::router())
        .nest("/loyalty", loyalty::router())
        .nest("/tracking", tracking::router())
        .nest("/returns", returns::router())
        .nest("/upload", upload::router())
        .nest("/admin", admin::router())
        .nest("/analytics", analytics::router())
        .nest("/payments", payments::router())
}

/// Trim a required text field and check its length in characters.
pub(crate) fn required_text(field: &str, value: &str, max_chars: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(value.to_string())
}

/// Like [`required_text`], but blank input becomes `None`.
pub(crate) fn optional_text(
    field: &str,
    value: Option<&str>,
    max_chars: usize,
) -> Result<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => required_text(field, value, max_chars).map(Some),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("name", "  Ana  ", 10).unwrap(), "Ana");
        assert!(required_text("name", "   ", 10).is_err());
        assert!(required_text("name", "abcdef", 5).is_err());
        // Length counts characters, not bytes
        assert_eq!(required_text("name", "ação", 4).unwrap(), "ação");
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text("note", None, 10).unwrap(), None);
        assert_eq!(optional_text("note", Some(" \n "), 10).unwrap(), None);
        assert_eq!(
            optional_text("note", Some(" ok "), 10).unwrap(),
            Some("ok".to_string())
        );
        assert!(optional_text("note", Some("too long"), 3).is_err());
    }
}
