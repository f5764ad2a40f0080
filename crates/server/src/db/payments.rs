//! Payment attempts at the gateway.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use mercado_core::{OrderId, PaymentId, PaymentStatus, Price};

use super::RepositoryError;

/// One hosted-checkout session at the gateway.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub provider_reference: String,
    pub status: PaymentStatus,
    pub amount: Price,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct PaymentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a checkout session created at the gateway.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the reference was already stored.
    pub async fn create(
        &self,
        order_id: OrderId,
        provider_reference: &str,
        amount: Price,
        checkout_url: &str,
    ) -> Result<Payment, RepositoryError> {
        sqlx::query_as::<_, Payment>(
            r"
            INSERT INTO payments (order_id, provider_reference, amount, checkout_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, provider_reference, status, amount, checkout_url,
                      created_at, updated_at
            ",
        )
        .bind(order_id)
        .bind(provider_reference)
        .bind(amount)
        .bind(checkout_url)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "payment reference already exists"))
    }
}

/// Load and lock a payment by the gateway's reference.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_reference(
    conn: &mut PgConnection,
    provider_reference: &str,
) -> Result<Option<Payment>, RepositoryError> {
    let payment = sqlx::query_as::<_, Payment>(
        r"
        SELECT id, order_id, provider_reference, status, amount, checkout_url,
               created_at, updated_at
        FROM payments
        WHERE provider_reference = $1
        FOR UPDATE
        ",
    )
    .bind(provider_reference)
    .fetch_optional(conn)
    .await?;

    Ok(payment)
}

/// Update a payment's status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_status(
    conn: &mut PgConnection,
    id: PaymentId,
    status: PaymentStatus,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}
