//! Database access for the Mercado `PostgreSQL` schema.
//!
//! # Tables
//!
//! - `users`, `addresses`, `stores` - Accounts
//! - `categories`, `products`, `product_images`, `reviews` - Catalog
//! - `carts`, `cart_items`, `wishlist_items`, `coupons` - Shopping
//! - `orders`, `order_items`, `order_tracking_events`, `payments` - Orders
//! - `returns`, `return_items`, `loyalty_transactions` - After-sales
//! - `support_tickets`, `support_messages` - Support
//! - `tower_sessions.session` - Session storage
//!
//! Reads go through the `*Repository` structs, which borrow the pool.
//! Steps of a multi-table transaction are free functions taking
//! `&mut PgConnection` so callers can compose them inside one `Transaction`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p mercado-cli -- migrate
//! ```

pub mod addresses;
pub mod analytics;
pub mod carts;
pub mod categories;
pub mod coupons;
pub mod loyalty;
pub mod orders;
pub mod payments;
pub mod products;
pub mod returns;
pub mod reviews;
pub mod stores;
pub mod support;
pub mod tracking;
pub mod users;
pub mod wishlist;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::AddressRepository;
pub use carts::CartRepository;
pub use categories::CategoryRepository;
pub use coupons::CouponRepository;
pub use loyalty::LoyaltyRepository;
pub use orders::OrderRepository;
pub use payments::PaymentRepository;
pub use products::ProductRepository;
pub use returns::ReturnRepository;
pub use reviews::ReviewRepository;
pub use stores::StoreRepository;
pub use support::SupportRepository;
pub use tracking::TrackingRepository;
pub use users::UserRepository;
pub use wishlist::WishlistRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and foreign-key violations to `Conflict` with `message`.
    pub(crate) fn from_constraint(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Page request from `?page=&per_page=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Items per page (default 20, max 100).
    pub per_page: Option<u32>,
}

impl Pagination {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    #[must_use]
    pub fn page(self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    #[must_use]
    pub fn per_page(self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    #[must_use]
    pub fn limit(self) -> i64 {
        i64::from(self.per_page())
    }

    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }
}

/// One page of results plus the total count.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self {
            items,
            page: pagination.page(),
            per_page: pagination.per_page(),
            total,
        }
    }

    /// Number of pages (at least 1).
    #[must_use]
    pub fn total_pages(&self) -> i64 {
        let per_page = i64::from(self.per_page.max(1));
        ((self.total + per_page - 1) / per_page).max(1)
    }

    /// Transform the items, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), 20);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination {
            page: Some(0),
            per_page: Some(1_000),
        };
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), 100);

        let p = Pagination {
            page: Some(3),
            per_page: Some(25),
        };
        assert_eq!(p.offset(), 50);
    }

    #[test]
    fn test_total_pages() {
        let pagination = Pagination {
            page: Some(1),
            per_page: Some(10),
        };
        assert_eq!(Page::<()>::new(vec![], pagination, 0).total_pages(), 1);
        assert_eq!(Page::<()>::new(vec![], pagination, 10).total_pages(), 1);
        assert_eq!(Page::<()>::new(vec![], pagination, 11).total_pages(), 2);
    }
}
