//! Admin reporting over orders and loyalty.

use axum::{Router, extract::State, routing::get};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mercado_core::Price;
use mercado_core::loyalty::LoyaltyTier;

use crate::db::analytics::{self, DailySales, ProductSales};
use crate::db::LoyaltyRepository;
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Window used when no `from` is given.
const DEFAULT_WINDOW_DAYS: u64 = 30;
const MAX_TOP_PRODUCTS: i64 = 100;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PeriodQuery {
    /// First day, inclusive (UTC). Defaults to 30 days before `to`.
    pub from: Option<NaiveDate>,
    /// Last day, inclusive (UTC). Defaults to today.
    pub to: Option<NaiveDate>,
    /// Top products only; default 10.
    pub limit: Option<i64>,
}

impl PeriodQuery {
    /// Half-open `[from, to + 1 day)` range in UTC.
    fn range(&self, today: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let to = self.to.unwrap_or(today);
        let from = match self.from {
            Some(from) => from,
            None => to
                .checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS))
                .ok_or_else(|| AppError::Validation("to is out of range".to_string()))?,
        };
        if from > to {
            return Err(AppError::Validation("from must not be after to".to_string()));
        }
        let end = to
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::Validation("to is out of range".to_string()))?;
        Ok((
            from.and_time(chrono::NaiveTime::MIN).and_utc(),
            end.and_time(chrono::NaiveTime::MIN).and_utc(),
        ))
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, MAX_TOP_PRODUCTS)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SalesReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub days: Vec<DailySales>,
    pub total_orders: i64,
    pub total_revenue: Price,
    pub average_order_value: Price,
}

impl SalesReport {
    fn new(from: DateTime<Utc>, to: DateTime<Utc>, days: Vec<DailySales>) -> Self {
        let total_orders: i64 = days.iter().map(|day| day.orders).sum();
        let total_revenue: Price = days.iter().map(|day| day.revenue).sum();
        let average_order_value = if total_orders > 0 {
            Price::new(total_revenue.amount() / Decimal::from(total_orders))
        } else {
            Price::ZERO
        };
        Self {
            from,
            to,
            days,
            total_orders,
            total_revenue,
            average_order_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct TierCount {
    pub tier: LoyaltyTier,
    pub users: i64,
}

/// Bucket users by the tier their lifetime points reach.
fn count_tiers(lifetime_points: &[i64]) -> Vec<TierCount> {
    LoyaltyTier::ALL
        .into_iter()
        .map(|tier| TierCount {
            tier,
            users: lifetime_points
                .iter()
                .filter(|&&points| LoyaltyTier::for_points(points) == tier)
                .count()
                .try_into()
                .unwrap_or(i64::MAX),
        })
        .collect()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sales", get(sales))
        .route("/top-products", get(top_products))
        .route("/loyalty", get(loyalty_tiers))
}

#[utoipa::path(
    get,
    path = "/analytics/sales",
    tag = "analytics",
    params(PeriodQuery),
    responses(
        (status = 200, description = "Per-day sales, cancelled orders excluded", body = SalesReport),
        (status = 400, description = "Invalid period", body = ErrorBody),
    )
)]
pub async fn sales(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<AppJson<SalesReport>> {
    let (from, to) = query.range(Utc::now().date_naive())?;
    let days = analytics::daily_sales(state.pool(), from, to).await?;
    Ok(AppJson(SalesReport::new(from, to, days)))
}

#[utoipa::path(
    get,
    path = "/analytics/top-products",
    tag = "analytics",
    params(PeriodQuery),
    responses((status = 200, description = "Best sellers by units", body = Vec<ProductSales>))
)]
pub async fn top_products(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<AppJson<Vec<ProductSales>>> {
    let (from, to) = query.range(Utc::now().date_naive())?;
    let rows = analytics::top_products(state.pool(), from, to, query.limit()).await?;
    Ok(AppJson(rows))
}

#[utoipa::path(
    get,
    path = "/analytics/loyalty",
    tag = "analytics",
    responses((status = 200, description = "Users per tier", body = Vec<TierCount>))
)]
pub async fn loyalty_tiers(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<AppJson<Vec<TierCount>>> {
    let points = LoyaltyRepository::new(state.pool()).lifetime_points_all().await?;
    Ok(AppJson(count_tiers(&points)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_range_is_thirty_days_inclusive() {
        let (from, to) = PeriodQuery::default().range(day(2026, 3, 31)).unwrap();
        assert_eq!(from.date_naive(), day(2026, 3, 1));
        assert_eq!(to.date_naive(), day(2026, 4, 1));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let query = PeriodQuery {
            from: Some(day(2026, 5, 2)),
            to: Some(day(2026, 5, 1)),
            limit: None,
        };
        assert!(query.range(day(2026, 6, 1)).is_err());
    }

    #[test]
    fn test_limit_clamped() {
        let query = PeriodQuery {
            limit: Some(1_000),
            ..PeriodQuery::default()
        };
        assert_eq!(query.limit(), 100);
        assert_eq!(PeriodQuery::default().limit(), 10);
    }

    #[test]
    fn test_sales_report_average() {
        let now = Utc::now();
        let report = SalesReport::new(
            now,
            now,
            vec![
                DailySales {
                    day: day(2026, 1, 1),
                    orders: 2,
                    revenue: Price::from_cents(10_000),
                },
                DailySales {
                    day: day(2026, 1, 2),
                    orders: 1,
                    revenue: Price::from_cents(5_000),
                },
            ],
        );
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.total_revenue, Price::from_cents(15_000));
        assert_eq!(report.average_order_value, Price::from_cents(5_000));

        let empty = SalesReport::new(now, now, Vec::new());
        assert_eq!(empty.average_order_value, Price::ZERO);
    }

    #[test]
    fn test_count_tiers() {
        let counts = count_tiers(&[0, 10, LoyaltyTier::Gold.threshold(), LoyaltyTier::Platinum.threshold() + 5]);
        let users: Vec<i64> = counts.iter().map(|row| row.users).collect();
        assert_eq!(users, vec![2, 0, 1, 1]);
        assert_eq!(counts.len(), LoyaltyTier::ALL.len());
    }
}
