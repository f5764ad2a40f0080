//! Catalog routes.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use mercado_core::slug::{is_valid_slug, slugify};
use mercado_core::{CategoryId, Price, ProductId, StoreId};

use super::{optional_text, required_text};
use crate::db::categories::Category;
use crate::db::products::{Product, ProductFilter, ProductImage, ProductInput, ProductListing, ProductSort};
use crate::db::{CategoryRepository, Page, Pagination, ProductRepository};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    /// Matches name or description.
    pub q: Option<String>,
    pub category: Option<CategoryId>,
    #[param(value_type = Option<String>)]
    pub min_price: Option<Price>,
    #[param(value_type = Option<String>)]
    pub max_price: Option<Price>,
    #[param(inline)]
    pub sort: Option<ProductSort>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductQuery {
    pub(crate) fn filter(&self) -> ProductFilter {
        ProductFilter {
            search: self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()).map(String::from),
            category_id: self.category,
            min_price: self.min_price,
            max_price: self.max_price,
            sort: self.sort.unwrap_or_default(),
        }
    }

    pub(crate) const fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub category: Option<Category>,
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ProductRequest {
    pub name: String,
    /// Derived from the name when omitted.
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub stock: i32,
    pub category_id: Option<CategoryId>,
    pub store_id: Option<StoreId>,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl ProductRequest {
    fn validate(self) -> Result<ProductInput> {
        let name = required_text("name", &self.name, 200)?;
        let slug = match self.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) if is_valid_slug(slug) => slug.to_string(),
            Some(_) => {
                return Err(AppError::Validation(
                    "slug may only contain lowercase letters, digits and single hyphens".to_string(),
                ));
            }
            None => slugify(&name),
        };
        if slug.is_empty() {
            return Err(AppError::Validation("name must contain letters or digits".to_string()));
        }
        if !self.price.is_storable() {
            return Err(AppError::Validation(format!("price cannot exceed {}", Price::MAX)));
        }
        if self.stock < 0 {
            return Err(AppError::Validation("stock cannot be negative".to_string()));
        }
        let description = optional_text("description", Some(&self.description), 10_000)?.unwrap_or_default();

        Ok(ProductInput {
            name,
            slug,
            description,
            price: self.price,
            stock: self.stock,
            category_id: self.category_id,
            store_id: self.store_id,
            active: self.active,
        })
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct StockAdjustment {
    /// Units to add; negative removes.
    pub delta: i32,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).put(update).delete(deactivate))
        .route("/{id}/stock", post(adjust_stock))
}

#[utoipa::path(
    get,
    path = "/products",
    tag = "products",
    params(ProductQuery),
    responses((status = 200, description = "Active products", body = Page<ProductListing>))
)]
pub async fn list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ProductQuery>,
) -> Result<AppJson<Page<ProductListing>>> {
    let pagination = query.pagination();
    let (items, total) = ProductRepository::new(state.pool())
        .list(&query.filter(), pagination)
        .await?;
    Ok(AppJson(Page::new(items, pagination, total)))
}

/// Load a product with everything its page shows. Inactive products are
/// visible only to admins.
pub(crate) async fn load_detail(
    state: &AppState,
    id: ProductId,
    include_inactive: bool,
) -> Result<ProductDetail> {
    let pool = state.pool();
    let products = ProductRepository::new(pool);
    let product = products
        .get(id)
        .await?
        .filter(|p| p.active || include_inactive)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let images = products.images(id).await?;
    let (average_rating, review_count) = products.rating(id).await?;
    let category = match product.category_id {
        Some(category_id) => CategoryRepository::new(pool).get(category_id).await?,
        None => None,
    };

    Ok(ProductDetail {
        product,
        images,
        category,
        average_rating,
        review_count,
    })
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    tag = "products",
    params(("id" = i32, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product detail", body = ProductDetail),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(viewer): OptionalAuth,
    Path(id): Path<ProductId>,
) -> Result<AppJson<ProductDetail>> {
    let is_admin = viewer.is_some_and(|user| user.is_admin());
    Ok(AppJson(load_detail(&state, id, is_admin).await?))
}

#[utoipa::path(
    post,
    path = "/products",
    tag = "products",
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Created", body = Product),
        (status = 400, description = "Invalid fields", body = ErrorBody),
        (status = 409, description = "Slug taken", body = ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppJson(request): AppJson<ProductRequest>,
) -> Result<(StatusCode, AppJson<Product>)> {
    let input = request.validate()?;
    let product = ProductRepository::new(state.pool()).create(&input).await?;
    info!(product_id = %product.id, admin_id = %admin.id, "Product created");
    Ok((StatusCode::CREATED, AppJson(product)))
}

#[utoipa::path(
    put,
    path = "/products/{id}",
    tag = "products",
    params(("id" = i32, Path, description = "Product ID")),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "Updated", body = Product),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<ProductId>,
    AppJson(request): AppJson<ProductRequest>,
) -> Result<AppJson<Product>> {
    let input = request.validate()?;
    let product = ProductRepository::new(state.pool()).update(id, &input).await?;
    Ok(AppJson(product))
}

#[utoipa::path(
    delete,
    path = "/products/{id}",
    tag = "products",
    params(("id" = i32, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn deactivate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool()).deactivate(id).await?;
    info!(product_id = %id, admin_id = %admin.id, "Product deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/products/{id}/stock",
    tag = "products",
    params(("id" = i32, Path, description = "Product ID")),
    request_body = StockAdjustment,
    responses(
        (status = 200, description = "Stock adjusted", body = Product),
        (status = 409, description = "Stock would go below zero", body = ErrorBody),
    )
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    AppJson(request): AppJson<StockAdjustment>,
) -> Result<AppJson<Product>> {
    if request.delta == 0 {
        return Err(AppError::Validation("delta must not be zero".to_string()));
    }
    let product = ProductRepository::new(state.pool()).adjust_stock(id, request.delta).await?;
    info!(product_id = %id, delta = request.delta, stock = product.stock, admin_id = %admin.id, "Stock adjusted");
    Ok(AppJson(product))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(name: &str, slug: Option<&str>) -> ProductRequest {
        ProductRequest {
            name: name.to_string(),
            slug: slug.map(String::from),
            description: String::new(),
            price: Price::from_cents(4_990),
            stock: 3,
            category_id: None,
            store_id: None,
            active: true,
        }
    }

    #[test]
    fn test_slug_derived_from_name() {
        let input = request("Caneca Térmica", None).validate().unwrap();
        assert_eq!(input.slug, "caneca-termica");
        assert_eq!(input.name, "Caneca Térmica");
    }

    #[test]
    fn test_rejects_bad_fields() {
        assert!(request("  ", None).validate().is_err());
        assert!(request("Mug", Some("Not A Slug")).validate().is_err());

        let mut negative = request("Mug", None);
        negative.stock = -1;
        assert!(negative.validate().is_err());

        let mut free = request("Mug", None);
        free.price = Price::ZERO;
        assert!(free.validate().is_ok());
    }

    #[test]
    fn test_query_defaults() {
        let query = ProductQuery::default();
        let filter = query.filter();
        assert_eq!(filter.sort, ProductSort::Newest);
        assert!(filter.search.is_none());
        assert_eq!(query.pagination().per_page(), 20);
    }
}
