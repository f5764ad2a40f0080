//! Order repository.
//!
//! Reads go through [`OrderRepository`]. Writes only ever happen as part of a
//! larger transaction (checkout, cancel, status change, return completion), so
//! they are exposed as free functions over `&mut PgConnection`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use mercado_core::pricing::OrderTotals;
use mercado_core::{
    CouponId, OrderId, OrderItemId, OrderStatus, PaymentStatus, Price, ProductId, UserId,
};

use super::addresses::AddressSnapshot;
use super::{Pagination, RepositoryError};

const ORDER_COLUMNS: &str = "id, user_id, status, payment_status, subtotal, discount, \
     points_discount, shipping, total, coupon_id, points_redeemed, points_earned, \
     shipping_address, tracking_code, carrier, notes, created_at, updated_at, paid_at, \
     shipped_at, delivered_at, cancelled_at";

/// An order header.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Price,
    pub discount: Price,
    pub points_discount: Price,
    pub shipping: Price,
    pub total: Price,
    pub coupon_id: Option<CouponId>,
    pub points_redeemed: i64,
    pub points_earned: i64,
    #[schema(value_type = AddressSnapshot)]
    pub shipping_address: Json<AddressSnapshot>,
    pub tracking_code: Option<String>,
    pub carrier: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Merchandise value the customer paid, shipping excluded.
    #[must_use]
    pub fn merchandise_value(&self) -> Price {
        self.subtotal
            .saturating_sub(self.discount)
            .saturating_sub(self.points_discount)
    }
}

/// A line of an order, with name and price frozen at checkout.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Price,
    pub quantity: i32,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price
            .times(u32::try_from(self.quantity).unwrap_or(0))
    }
}

/// Header fields for a new order.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub user_id: UserId,
    pub totals: &'a OrderTotals,
    pub coupon_id: Option<CouponId>,
    pub shipping_address: &'a AddressSnapshot,
    pub notes: Option<&'a str>,
}

/// Order count per status.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Get an order by its carrier tracking code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_tracking_code(&self, code: &str) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tracking_code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Lines of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        items(&mut conn, order_id).await
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        Ok((orders, total))
    }

    /// All orders, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        pagination: Pagination,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE $1::order_status IS NULL OR status = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE $1::order_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok((orders, total))
    }

    /// Number of orders in each status that has any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_by_status(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let counts = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(counts)
    }

    /// Sum of totals of orders that were paid and not cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue(&self) -> Result<Price, RepositoryError> {
        let revenue = sqlx::query_scalar::<_, Price>(
            r"
            SELECT COALESCE(SUM(total), 0) FROM orders
            WHERE status NOT IN ('pending', 'cancelled')
            ",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(revenue)
    }

    /// Whether the user has a delivered order containing the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_delivered_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let found = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM orders o
                JOIN order_items oi ON oi.order_id = o.id
                WHERE o.user_id = $1 AND oi.product_id = $2
                  AND o.status IN ('delivered', 'partially_refunded', 'refunded')
            )
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(self.pool)
        .await?;
        Ok(found)
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Insert an order header in `pending` state.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(conn: &mut PgConnection, order: &NewOrder<'_>) -> Result<Order, RepositoryError> {
    let totals = order.totals;
    let created = sqlx::query_as::<_, Order>(&format!(
        r"
        INSERT INTO orders (user_id, subtotal, discount, points_discount, shipping, total,
                            coupon_id, points_redeemed, shipping_address, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(order.user_id)
    .bind(totals.subtotal)
    .bind(totals.discount)
    .bind(totals.points_discount)
    .bind(totals.shipping)
    .bind(totals.total)
    .bind(order.coupon_id)
    .bind(totals.points_redeemed)
    .bind(Json(order.shipping_address))
    .bind(order.notes)
    .fetch_one(conn)
    .await?;

    Ok(created)
}

/// Insert one order line.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    product_id: ProductId,
    product_name: &str,
    unit_price: Price,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(order_id)
    .bind(product_id)
    .bind(product_name)
    .bind(unit_price)
    .bind(quantity)
    .execute(conn)
    .await?;
    Ok(())
}

/// Lines of an order on an existing connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(conn: &mut PgConnection, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
    let items = sqlx::query_as::<_, OrderItem>(
        r"
        SELECT id, order_id, product_id, product_name, unit_price, quantity
        FROM order_items
        WHERE order_id = $1
        ORDER BY id
        ",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Load and lock an order header.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Move an order to `status`, stamping the matching timestamp.
///
/// Callers check the transition first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        r"
        UPDATE orders
        SET status = $2,
            updated_at = NOW(),
            paid_at = CASE WHEN $2 = 'paid' THEN NOW() ELSE paid_at END,
            shipped_at = CASE WHEN $2 = 'shipped' THEN NOW() ELSE shipped_at END,
            delivered_at = CASE WHEN $2 = 'delivered' THEN NOW() ELSE delivered_at END,
            cancelled_at = CASE WHEN $2 = 'cancelled' THEN NOW() ELSE cancelled_at END
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Set the order's payment status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_payment_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: PaymentStatus,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE orders SET payment_status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}

/// Record points awarded on delivery.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_points_earned(
    conn: &mut PgConnection,
    id: OrderId,
    points: i64,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE orders SET points_earned = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(points)
        .execute(conn)
        .await?;
    Ok(())
}

/// Set the tracking code if the order has none yet, and the carrier if given.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the code belongs to another order.
pub async fn set_tracking(
    conn: &mut PgConnection,
    id: OrderId,
    tracking_code: Option<&str>,
    carrier: Option<&str>,
) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        r"
        UPDATE orders
        SET tracking_code = COALESCE(tracking_code, $2),
            carrier = COALESCE($3, carrier),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(tracking_code)
    .bind(carrier)
    .fetch_optional(conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "tracking code is already used by another order"))?
    .ok_or(RepositoryError::NotFound)
}
