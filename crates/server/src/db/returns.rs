//! Return (RMA) repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use mercado_core::{
    OrderId, OrderItemId, Price, ProductId, ReturnId, ReturnItemId, ReturnKind, ReturnStatus,
    UserId,
};

use super::{Pagination, RepositoryError};

const RETURN_COLUMNS: &str = "id, order_id, user_id, kind, status, reason, refund_amount, \
     points_reverted, resolution_note, created_at, updated_at, completed_at";

/// A customer's request to send items back.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ReturnRequest {
    pub id: ReturnId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub kind: ReturnKind,
    pub status: ReturnStatus,
    pub reason: String,
    pub refund_amount: Price,
    pub points_reverted: i64,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A returned quantity of one order line.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ReturnItem {
    pub id: ReturnItemId,
    pub order_item_id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Price,
    pub quantity: i32,
}

pub struct ReturnRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReturnRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a return by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ReturnId) -> Result<Option<ReturnRequest>, RepositoryError> {
        let found = sqlx::query_as::<_, ReturnRequest>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(found)
    }

    /// Items of a return.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, return_id: ReturnId) -> Result<Vec<ReturnItem>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        items(&mut conn, return_id).await
    }

    /// A user's returns, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<(Vec<ReturnRequest>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, ReturnRequest>(&format!(
            r"
            SELECT {RETURN_COLUMNS} FROM returns
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

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM returns WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        Ok((rows, total))
    }

    /// All returns, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(
        &self,
        status: Option<ReturnStatus>,
        pagination: Pagination,
    ) -> Result<(Vec<ReturnRequest>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, ReturnRequest>(&format!(
            r"
            SELECT {RETURN_COLUMNS} FROM returns
            WHERE $1::return_status IS NULL OR status = $1
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
            "SELECT COUNT(*) FROM returns WHERE $1::return_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Returns waiting for a decision.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_pending(&self) -> Result<i64, RepositoryError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM returns WHERE status = 'requested'")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Items of a return on an existing connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(
    conn: &mut PgConnection,
    return_id: ReturnId,
) -> Result<Vec<ReturnItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, ReturnItem>(
        r"
        SELECT ri.id, ri.order_item_id, oi.product_id, oi.product_name, oi.unit_price, ri.quantity
        FROM return_items ri
        JOIN order_items oi ON oi.id = ri.order_item_id
        WHERE ri.return_id = $1
        ORDER BY ri.id
        ",
    )
    .bind(return_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Units of each order line already covered by non-rejected returns.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn returned_quantities(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<HashMap<OrderItemId, i64>, RepositoryError> {
    let rows = sqlx::query_as::<_, (OrderItemId, i64)>(
        r"
        SELECT ri.order_item_id, SUM(ri.quantity)::BIGINT
        FROM return_items ri
        JOIN returns r ON r.id = ri.return_id
        WHERE r.order_id = $1 AND r.status <> 'rejected'
        GROUP BY ri.order_item_id
        ",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Insert a return in `requested` state.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order already has an open return.
pub async fn insert(
    conn: &mut PgConnection,
    order_id: OrderId,
    user_id: UserId,
    kind: ReturnKind,
    reason: &str,
) -> Result<ReturnRequest, RepositoryError> {
    sqlx::query_as::<_, ReturnRequest>(&format!(
        r"
        INSERT INTO returns (order_id, user_id, kind, reason)
        VALUES ($1, $2, $3, $4)
        RETURNING {RETURN_COLUMNS}
        "
    ))
    .bind(order_id)
    .bind(user_id)
    .bind(kind)
    .bind(reason)
    .fetch_one(conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "order already has an open return"))
}

/// Add an item to a return.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the line is listed twice.
pub async fn insert_item(
    conn: &mut PgConnection,
    return_id: ReturnId,
    order_item_id: OrderItemId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT INTO return_items (return_id, order_item_id, quantity) VALUES ($1, $2, $3)")
        .bind(return_id)
        .bind(order_item_id)
        .bind(quantity)
        .execute(conn)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "order item listed more than once"))?;
    Ok(())
}

/// Load and lock a return.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the return does not exist.
pub async fn lock(conn: &mut PgConnection, id: ReturnId) -> Result<ReturnRequest, RepositoryError> {
    sqlx::query_as::<_, ReturnRequest>(&format!(
        "SELECT {RETURN_COLUMNS} FROM returns WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Move a return to `status`, optionally recording a note.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the return does not exist.
pub async fn set_status(
    conn: &mut PgConnection,
    id: ReturnId,
    status: ReturnStatus,
    note: Option<&str>,
) -> Result<ReturnRequest, RepositoryError> {
    sqlx::query_as::<_, ReturnRequest>(&format!(
        r"
        UPDATE returns
        SET status = $2, resolution_note = COALESCE($3, resolution_note), updated_at = NOW()
        WHERE id = $1
        RETURNING {RETURN_COLUMNS}
        "
    ))
    .bind(id)
    .bind(status)
    .bind(note)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Mark a return completed with its refund and reverted points.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the return does not exist.
pub async fn complete(
    conn: &mut PgConnection,
    id: ReturnId,
    refund_amount: Price,
    points_reverted: i64,
) -> Result<ReturnRequest, RepositoryError> {
    sqlx::query_as::<_, ReturnRequest>(&format!(
        r"
        UPDATE returns
        SET status = 'completed', refund_amount = $2, points_reverted = $3,
            completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING {RETURN_COLUMNS}
        "
    ))
    .bind(id)
    .bind(refund_amount)
    .bind(points_reverted)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}
