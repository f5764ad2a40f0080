//! Loyalty balance queries and manual adjustments.

use serde::Deserialize;
use tracing::{info, instrument};

use mercado_core::loyalty::LoyaltySummary;
use mercado_core::{LoyaltyTransactionKind, UserId};

use crate::db::{RepositoryError, UserRepository, loyalty};
use crate::error::AppError;

/// Largest credit or debit a single adjustment may carry.
pub const MAX_ADJUSTMENT_POINTS: i64 = 1_000_000;

/// Staff correction of a customer's balance.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct Adjustment {
    pub user_id: UserId,
    /// Signed; negative debits.
    pub points: i64,
    pub description: String,
}

impl Adjustment {
    fn validate(&self) -> Result<&str, AppError> {
        if self.points == 0 {
            return Err(AppError::Validation("points must not be zero".to_string()));
        }
        if self.points.unsigned_abs() > MAX_ADJUSTMENT_POINTS.unsigned_abs() {
            return Err(AppError::Validation(format!(
                "points must be between -{MAX_ADJUSTMENT_POINTS} and {MAX_ADJUSTMENT_POINTS}"
            )));
        }
        let description = self.description.trim();
        if description.is_empty() {
            return Err(AppError::Validation("description is required".to_string()));
        }
        if description.chars().count() > 255 {
            return Err(AppError::Validation(
                "description must be at most 255 characters".to_string(),
            ));
        }
        Ok(description)
    }
}

/// Balance after applying `points`.
fn adjusted_balance(balance: i64, points: i64) -> Result<i64, AppError> {
    let next = balance
        .checked_add(points)
        .ok_or_else(|| AppError::Validation("Adjustment overflows the balance".to_string()))?;
    if next < 0 {
        return Err(AppError::BadRequest(format!(
            "Cannot debit {} points from a balance of {balance}",
            points.unsigned_abs()
        )));
    }
    Ok(next)
}

pub struct LoyaltyService<'a> {
    pool: &'a sqlx::PgPool,
}

impl<'a> LoyaltyService<'a> {
    #[must_use]
    pub const fn new(pool: &'a sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Balance, tier and progress for a user.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist.
    pub async fn summary(&self, user_id: UserId) -> Result<LoyaltySummary, AppError> {
        let user = UserRepository::new(self.pool)
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(LoyaltySummary::new(user.loyalty_points, user.lifetime_points))
    }

    /// Apply a manual adjustment; the balance never goes below zero.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero or undescribed adjustment, `NotFound` for an
    /// unknown user, `BadRequest` if a debit exceeds the balance.
    #[instrument(skip(self, adjustment), fields(user_id = %adjustment.user_id, points = adjustment.points))]
    pub async fn adjust(&self, adjustment: &Adjustment) -> Result<LoyaltySummary, AppError> {
        let description = adjustment.validate()?;

        let mut tx = self.pool.begin().await?;
        let balance = loyalty::lock_balance(&mut tx, adjustment.user_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AppError::NotFound("User not found".to_string()),
                other => other.into(),
            })?;

        adjusted_balance(balance.loyalty_points, adjustment.points)?;

        let updated = loyalty::record(
            &mut tx,
            adjustment.user_id,
            None,
            LoyaltyTransactionKind::Adjust,
            adjustment.points,
            description,
        )
        .await?;
        tx.commit().await?;

        info!(balance = updated.loyalty_points, "Loyalty balance adjusted");
        Ok(LoyaltySummary::new(updated.loyalty_points, updated.lifetime_points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjustment(points: i64, description: &str) -> Adjustment {
        Adjustment {
            user_id: UserId::new(1),
            points,
            description: description.to_string(),
        }
    }

    #[test]
    fn test_adjustment_validation() {
        assert!(adjustment(100, "Goodwill credit").validate().is_ok());
        assert!(adjustment(-50, "Correction").validate().is_ok());
        assert!(adjustment(0, "Nothing").validate().is_err());
        assert!(adjustment(10, "   ").validate().is_err());
        assert!(adjustment(10, &"x".repeat(256)).validate().is_err());
        assert!(adjustment(MAX_ADJUSTMENT_POINTS, "Cap").validate().is_ok());
        assert!(adjustment(MAX_ADJUSTMENT_POINTS + 1, "Too much").validate().is_err());
        assert!(adjustment(i64::MAX, "Overflow").validate().is_err());
        assert!(adjustment(i64::MIN, "Underflow").validate().is_err());
    }

    #[test]
    fn test_adjusted_balance() {
        assert_eq!(adjusted_balance(500, -200).ok(), Some(300));
        assert_eq!(adjusted_balance(500, -500).ok(), Some(0));
        assert!(matches!(adjusted_balance(100, -101), Err(AppError::BadRequest(_))));
        assert!(matches!(adjusted_balance(i64::MAX, 1), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_adjustment_description_trimmed() {
        let adj = adjustment(10, "  Birthday bonus  ");
        assert_eq!(adj.validate().unwrap_or_default(), "Birthday bonus");
    }
}
