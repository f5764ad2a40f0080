//! Loyalty balance, ledger and tier table.

use axum::{Router, extract::State, routing::{get, post}};

use mercado_core::loyalty::{LoyaltySummary, TierInfo, tier_table};

use crate::db::loyalty::LoyaltyTransaction;
use crate::db::{LoyaltyRepository, Page, Pagination};
use crate::error::{ErrorBody, Result};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::services::loyalty::{Adjustment, LoyaltyService};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(summary))
        .route("/transactions", get(transactions))
        .route("/tiers", get(tiers))
        .route("/adjust", post(adjust))
}

#[utoipa::path(
    get,
    path = "/loyalty",
    tag = "loyalty",
    responses(
        (status = 200, description = "Balance and tier position", body = LoyaltySummary),
        (status = 401, description = "Not logged in", body = ErrorBody),
    )
)]
pub async fn summary(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<AppJson<LoyaltySummary>> {
    Ok(AppJson(LoyaltyService::new(state.pool()).summary(user.id).await?))
}

#[utoipa::path(
    get,
    path = "/loyalty/transactions",
    tag = "loyalty",
    params(Pagination),
    responses((status = 200, description = "Ledger, newest first", body = Page<LoyaltyTransaction>))
)]
pub async fn transactions(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppQuery(pagination): AppQuery<Pagination>,
) -> Result<AppJson<Page<LoyaltyTransaction>>> {
    let (items, total) = LoyaltyRepository::new(state.pool())
        .transactions(user.id, pagination)
        .await?;
    Ok(AppJson(Page::new(items, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/loyalty/tiers",
    tag = "loyalty",
    responses((status = 200, description = "Tier thresholds and multipliers", body = Vec<TierInfo>))
)]
pub async fn tiers() -> AppJson<Vec<TierInfo>> {
    AppJson(tier_table())
}

#[utoipa::path(
    post,
    path = "/loyalty/adjust",
    tag = "loyalty",
    request_body = Adjustment,
    responses(
        (status = 200, description = "Customer's summary after the adjustment", body = LoyaltySummary),
        (status = 400, description = "Would make the balance negative", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
    )
)]
pub async fn adjust(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    AppJson(request): AppJson<Adjustment>,
) -> Result<AppJson<LoyaltySummary>> {
    Ok(AppJson(LoyaltyService::new(state.pool()).adjust(&request).await?))
}
