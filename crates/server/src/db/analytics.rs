//! Read-only reporting queries for the admin analytics endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;

use mercado_core::{Price, ProductId};

use super::RepositoryError;

/// Orders and revenue on one calendar day (UTC).
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct DailySales {
    pub day: NaiveDate,
    pub orders: i64,
    pub revenue: Price,
}

/// Units and revenue of one product over a period.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub product_name: String,
    pub units: i64,
    pub revenue: Price,
}

/// Per-day sales between `from` (inclusive) and `to` (exclusive).
/// Cancelled orders are excluded.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn daily_sales(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<DailySales>, RepositoryError> {
    let rows = sqlx::query_as::<_, DailySales>(
        r"
        SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
               COUNT(*) AS orders,
               COALESCE(SUM(total), 0) AS revenue
        FROM orders
        WHERE created_at >= $1 AND created_at < $2
          AND status <> 'cancelled'
        GROUP BY day
        ORDER BY day
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Best-selling products by units between `from` and `to`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn top_products(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ProductSales>, RepositoryError> {
    let rows = sqlx::query_as::<_, ProductSales>(
        r"
        SELECT oi.product_id,
               MAX(oi.product_name) AS product_name,
               SUM(oi.quantity)::BIGINT AS units,
               COALESCE(SUM(oi.unit_price * oi.quantity), 0) AS revenue
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        WHERE o.created_at >= $1 AND o.created_at < $2
          AND o.status <> 'cancelled'
        GROUP BY oi.product_id
        ORDER BY units DESC, revenue DESC, oi.product_id
        LIMIT $3
        ",
    )
    .bind(from)
    .bind(to)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
