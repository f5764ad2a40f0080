//! Loyalty ledger.
//!
//! `users.loyalty_points` is the spendable balance and `users.lifetime_points`
//! the total ever earned. Every change to either goes through one of the
//! transaction steps below, which also append to `loyalty_transactions`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use mercado_core::{LoyaltyTransactionId, LoyaltyTransactionKind, OrderId, UserId};

use super::{Pagination, RepositoryError};

/// One ledger entry. `points` is signed: positive credits, negative debits.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct LoyaltyTransaction {
    pub id: LoyaltyTransactionId,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub kind: LoyaltyTransactionKind,
    pub points: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Balance pair read under a row lock.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct PointBalance {
    pub loyalty_points: i64,
    pub lifetime_points: i64,
}

pub struct LoyaltyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LoyaltyRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A user's ledger, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transactions(
        &self,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<(Vec<LoyaltyTransaction>, i64), RepositoryError> {
        let items = sqlx::query_as::<_, LoyaltyTransaction>(
            r"
            SELECT id, user_id, order_id, kind, points, description, created_at
            FROM loyalty_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM loyalty_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok((items, total))
    }

    /// Lifetime points of every user, for tier bucketing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lifetime_points_all(&self) -> Result<Vec<i64>, RepositoryError> {
        let points = sqlx::query_scalar::<_, i64>("SELECT lifetime_points FROM users")
            .fetch_all(self.pool)
            .await?;
        Ok(points)
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Lock a user's point balance until the transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
pub async fn lock_balance(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<PointBalance, RepositoryError> {
    sqlx::query_as::<_, PointBalance>(
        "SELECT loyalty_points, lifetime_points FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Append a ledger entry and apply it to the balance.
///
/// Only `Earn` entries count towards lifetime points. A debit larger than
/// the balance fails with `Conflict` and leaves nothing written.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the balance would go negative.
pub async fn record(
    conn: &mut PgConnection,
    user_id: UserId,
    order_id: Option<OrderId>,
    kind: LoyaltyTransactionKind,
    points: i64,
    description: &str,
) -> Result<PointBalance, RepositoryError> {
    let lifetime_delta = if kind == LoyaltyTransactionKind::Earn {
        points.max(0)
    } else {
        0
    };

    let balance = sqlx::query_as::<_, PointBalance>(
        r"
        UPDATE users
        SET loyalty_points = loyalty_points + $2,
            lifetime_points = lifetime_points + $3,
            updated_at = NOW()
        WHERE id = $1 AND loyalty_points + $2 >= 0
        RETURNING loyalty_points, lifetime_points
        ",
    )
    .bind(user_id)
    .bind(points)
    .bind(lifetime_delta)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| RepositoryError::Conflict("loyalty balance cannot go below zero".to_owned()))?;

    sqlx::query(
        r"
        INSERT INTO loyalty_transactions (user_id, order_id, kind, points, description)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(user_id)
    .bind(order_id)
    .bind(kind)
    .bind(points)
    .bind(description)
    .execute(&mut *conn)
    .await?;

    Ok(balance)
}
