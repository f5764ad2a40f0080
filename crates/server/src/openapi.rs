//! `OpenAPI` document for the JSON API, served at `/docs/openapi.json`.
//!
//! Paths are relative to the `/api` server prefix. Schemas referenced from
//! request and response bodies are collected automatically.

use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::routes;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mercado API",
        description = "Catalog, checkout, loyalty and after-sales API for the Mercado store."
    ),
    servers((url = "/api")),
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::logout,
        routes::auth::me,
        routes::auth::change_password,
        routes::products::list,
        routes::products::show,
        routes::products::create,
        routes::products::update,
        routes::products::deactivate,
        routes::products::adjust_stock,
        routes::categories::list,
        routes::categories::show,
        routes::categories::create,
        routes::categories::update,
        routes::categories::delete,
        routes::cart::show,
        routes::cart::add_item,
        routes::cart::set_quantity,
        routes::cart::remove_item,
        routes::cart::clear,
        routes::orders::checkout,
        routes::orders::list,
        routes::orders::show,
        routes::orders::cancel,
        routes::orders::update_status,
        routes::addresses::list,
        routes::addresses::show,
        routes::addresses::create,
        routes::addresses::update,
        routes::addresses::delete,
        routes::addresses::lookup_cep,
        routes::reviews::for_product,
        routes::reviews::create,
        routes::reviews::update,
        routes::reviews::delete,
        routes::coupons::preview,
        routes::coupons::list,
        routes::coupons::create,
        routes::coupons::update,
        routes::coupons::deactivate,
        routes::wishlist::list,
        routes::wishlist::add,
        routes::wishlist::remove,
        routes::wishlist::move_to_cart,
        routes::support::create,
        routes::support::list,
        routes::support::show,
        routes::support::reply,
        routes::support::set_status,
        routes::loyalty::summary,
        routes::loyalty::transactions,
        routes::loyalty::tiers,
        routes::loyalty::adjust,
        routes::tracking::add_event,
        routes::tracking::for_order,
        routes::tracking::by_code,
        routes::returns::create,
        routes::returns::list,
        routes::returns::show,
        routes::returns::approve,
        routes::returns::reject,
        routes::returns::complete,
        routes::payments::start_checkout,
        routes::payments::notification,
        routes::upload::upload_image,
        routes::admin::dashboard,
        routes::admin::list_users,
        routes::admin::change_role,
        routes::admin::list_orders,
        routes::admin::list_stores,
        routes::admin::create_store,
        routes::analytics::sales,
        routes::analytics::top_products,
        routes::analytics::loyalty_tiers,
    ),
    components(schemas(
        crate::error::ErrorBody,
        mercado_core::OrderStatus,
        mercado_core::PaymentStatus,
        mercado_core::ReturnStatus,
        mercado_core::TicketStatus,
        mercado_core::Role,
        mercado_core::loyalty::LoyaltyTier,
    )),
    tags(
        (name = "auth", description = "Accounts and sessions"),
        (name = "products", description = "Product catalog"),
        (name = "catalog", description = "Category tree"),
        (name = "cart", description = "Shopping cart"),
        (name = "orders", description = "Checkout and order lifecycle"),
        (name = "addresses", description = "Address book and CEP lookup"),
        (name = "reviews", description = "Product reviews"),
        (name = "coupons", description = "Discount coupons"),
        (name = "wishlist", description = "Saved products"),
        (name = "support", description = "Support tickets"),
        (name = "loyalty", description = "Loyalty points and tiers"),
        (name = "tracking", description = "Shipment tracking"),
        (name = "returns", description = "Returns and exchanges"),
        (name = "payments", description = "Payment gateway"),
        (name = "upload", description = "Product images"),
        (name = "admin", description = "Back office"),
        (name = "analytics", description = "Sales and loyalty reports"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_core_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/products", "/orders", "/orders/{id}/cancel", "/returns", "/analytics/sales"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
