//! Coupon preview and admin coupon management.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use mercado_core::coupon::{CouponKind, CouponRule, normalize_code, validate_code};
use mercado_core::{CouponId, Price};

use super::optional_text;
use crate::db::CouponRepository;
use crate::db::coupons::{Coupon, CouponInput};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::services::cart::CartService;
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ValidateCoupon {
    pub code: String,
    /// Defaults to the current cart subtotal.
    pub subtotal: Option<Price>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CouponPreview {
    pub code: String,
    pub kind: CouponKind,
    pub subtotal: Price,
    pub discount: Price,
    pub total_after_discount: Price,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CouponRequest {
    pub code: String,
    pub description: Option<String>,
    pub kind: CouponKind,
    #[schema(value_type = String, example = "10")]
    pub value: Decimal,
    pub min_order_amount: Option<Price>,
    pub max_discount: Option<Price>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl CouponRequest {
    fn validate(self) -> Result<CouponInput> {
        let code = normalize_code(&self.code);
        validate_code(&code)?;
        let rule = CouponRule {
            kind: self.kind,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount: self.max_discount,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            usage_limit: self.usage_limit,
            used_count: 0,
            active: self.active,
        };
        rule.check_definition()?;

        Ok(CouponInput {
            code,
            description: optional_text("description", self.description.as_deref(), 500)?,
            rule,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/validate", post(preview))
        .route("/{id}", put(update).delete(deactivate))
}

#[utoipa::path(
    post,
    path = "/coupons/validate",
    tag = "coupons",
    request_body = ValidateCoupon,
    responses(
        (status = 200, description = "Discount the coupon would give", body = CouponPreview),
        (status = 400, description = "Coupon cannot be applied", body = ErrorBody),
        (status = 404, description = "Unknown coupon", body = ErrorBody),
    )
)]
pub async fn preview(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<ValidateCoupon>,
) -> Result<AppJson<CouponPreview>> {
    let coupon = CouponRepository::new(state.pool())
        .get_by_code(&normalize_code(&request.code))
        .await?
        .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?;

    let subtotal = match request.subtotal {
        Some(subtotal) => subtotal,
        None => CartService::new(state.pool()).view(user.id).await?.subtotal,
    };
    let discount = coupon.rule().apply(subtotal, Utc::now())?;

    Ok(AppJson(CouponPreview {
        code: coupon.code,
        kind: coupon.kind,
        subtotal,
        discount,
        total_after_discount: subtotal.saturating_sub(discount),
    }))
}

#[utoipa::path(
    get,
    path = "/coupons",
    tag = "coupons",
    responses((status = 200, description = "All coupons", body = Vec<Coupon>))
)]
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<AppJson<Vec<Coupon>>> {
    Ok(AppJson(CouponRepository::new(state.pool()).list().await?))
}

#[utoipa::path(
    post,
    path = "/coupons",
    tag = "coupons",
    request_body = CouponRequest,
    responses(
        (status = 201, description = "Created", body = Coupon),
        (status = 400, description = "Invalid definition", body = ErrorBody),
        (status = 409, description = "Code already exists", body = ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppJson(request): AppJson<CouponRequest>,
) -> Result<(StatusCode, AppJson<Coupon>)> {
    let input = request.validate()?;
    let coupon = CouponRepository::new(state.pool()).create(&input).await?;
    info!(coupon = %coupon.code, admin_id = %admin.id, "Coupon created");
    Ok((StatusCode::CREATED, AppJson(coupon)))
}

#[utoipa::path(
    put,
    path = "/coupons/{id}",
    tag = "coupons",
    params(("id" = i32, Path, description = "Coupon ID")),
    request_body = CouponRequest,
    responses(
        (status = 200, description = "Updated", body = Coupon),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<CouponId>,
    AppJson(request): AppJson<CouponRequest>,
) -> Result<AppJson<Coupon>> {
    let input = request.validate()?;
    Ok(AppJson(CouponRepository::new(state.pool()).update(id, &input).await?))
}

#[utoipa::path(
    delete,
    path = "/coupons/{id}",
    tag = "coupons",
    params(("id" = i32, Path, description = "Coupon ID")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn deactivate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<CouponId>,
) -> Result<StatusCode> {
    CouponRepository::new(state.pool()).deactivate(id).await?;
    info!(coupon_id = %id, admin_id = %admin.id, "Coupon deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(code: &str, kind: CouponKind, value: i64) -> CouponRequest {
        CouponRequest {
            code: code.to_string(),
            description: None,
            kind,
            value: Decimal::from(value),
            min_order_amount: None,
            max_discount: None,
            starts_at: None,
            expires_at: None,
            usage_limit: Some(10),
            active: true,
        }
    }

    #[test]
    fn test_code_is_normalized() {
        let input = request(" welcome10 ", CouponKind::Percentage, 10).validate().unwrap();
        assert_eq!(input.code, "WELCOME10");
        assert_eq!(input.rule.used_count, 0);
    }

    #[test]
    fn test_rejects_bad_definitions() {
        assert!(request("BIG", CouponKind::Percentage, 150).validate().is_err());
        assert!(request("ZERO", CouponKind::Fixed, 0).validate().is_err());
        assert!(request("has space", CouponKind::Fixed, 5).validate().is_err());

        let mut unlimited_zero = request("LIMIT", CouponKind::Fixed, 5);
        unlimited_zero.usage_limit = Some(0);
        assert!(unlimited_zero.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_max_discount() {
        let mut capped = request("CAPPED", CouponKind::Percentage, 10);
        capped.max_discount = Some(Price::ZERO);
        assert!(capped.validate().is_err());
    }

    #[test]
    fn test_preview_body_rejects_negative_subtotal() {
        let body = r#"{"code": "WELCOME10", "subtotal": "-50"}"#;
        assert!(serde_json::from_str::<ValidateCoupon>(body).is_err());

        let body = r#"{"code": "WELCOME10", "subtotal": "79228162514264337593543950335"}"#;
        assert!(serde_json::from_str::<ValidateCoupon>(body).is_err());

        let body = r#"{"code": "WELCOME10", "subtotal": "120.00"}"#;
        let parsed: ValidateCoupon = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.subtotal, Some(Price::from_cents(12_000)));
    }
}
