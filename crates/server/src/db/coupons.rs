//! Coupon repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use mercado_core::coupon::{CouponKind, CouponRule};
use mercado_core::{CouponId, Price};

use super::RepositoryError;

const COUPON_COLUMNS: &str = "id, code, description, kind, value, min_order_amount, max_discount, \
     starts_at, expires_at, usage_limit, used_count, active, created_at";

/// A stored coupon.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub description: Option<String>,
    pub kind: CouponKind,
    #[schema(value_type = String, example = "10.00")]
    pub value: Decimal,
    pub min_order_amount: Option<Price>,
    pub max_discount: Option<Price>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// The pricing rule carried by this coupon.
    #[must_use]
    pub fn rule(&self) -> CouponRule {
        CouponRule {
            kind: self.kind,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount: self.max_discount,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            usage_limit: self.usage_limit,
            used_count: self.used_count,
            active: self.active,
        }
    }
}

/// Fields for creating or replacing a coupon. `code` is already normalized.
#[derive(Debug, Clone)]
pub struct CouponInput {
    pub code: String,
    pub description: Option<String>,
    pub rule: CouponRule,
}

pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All coupons, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Coupon>, RepositoryError> {
        let coupons = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(coupons)
    }

    /// Look up a coupon by its normalized code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        Ok(coupon)
    }

    /// Create a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    pub async fn create(&self, input: &CouponInput) -> Result<Coupon, RepositoryError> {
        let rule = &input.rule;
        sqlx::query_as::<_, Coupon>(&format!(
            r"
            INSERT INTO coupons (code, description, kind, value, min_order_amount, max_discount,
                                 starts_at, expires_at, usage_limit, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {COUPON_COLUMNS}
            "
        ))
        .bind(&input.code)
        .bind(input.description.as_deref())
        .bind(rule.kind)
        .bind(rule.value)
        .bind(rule.min_order_amount)
        .bind(rule.max_discount)
        .bind(rule.starts_at)
        .bind(rule.expires_at)
        .bind(rule.usage_limit)
        .bind(rule.active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "coupon code already exists"))
    }

    /// Replace a coupon's definition. `used_count` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon does not exist and
    /// `RepositoryError::Conflict` if the new code is taken.
    pub async fn update(&self, id: CouponId, input: &CouponInput) -> Result<Coupon, RepositoryError> {
        let rule = &input.rule;
        sqlx::query_as::<_, Coupon>(&format!(
            r"
            UPDATE coupons
            SET code = $2, description = $3, kind = $4, value = $5, min_order_amount = $6,
                max_discount = $7, starts_at = $8, expires_at = $9, usage_limit = $10, active = $11
            WHERE id = $1
            RETURNING {COUPON_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.code)
        .bind(input.description.as_deref())
        .bind(rule.kind)
        .bind(rule.value)
        .bind(rule.min_order_amount)
        .bind(rule.max_discount)
        .bind(rule.starts_at)
        .bind(rule.expires_at)
        .bind(rule.usage_limit)
        .bind(rule.active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "coupon code already exists"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Deactivate a coupon. Orders that used it keep their reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon does not exist.
    pub async fn deactivate(&self, id: CouponId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE coupons SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Load and lock a coupon by code so its usage count cannot race.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_code(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<Coupon>, RepositoryError> {
    let coupon = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
    ))
    .bind(code)
    .fetch_optional(conn)
    .await?;

    Ok(coupon)
}

/// Count one use of a coupon.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn increment_usage(conn: &mut PgConnection, id: CouponId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Give back one use of a coupon (order cancelled).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn decrement_usage(conn: &mut PgConnection, id: CouponId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE coupons SET used_count = GREATEST(used_count - 1, 0) WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
