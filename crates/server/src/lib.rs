//! Mercado server library.
//!
//! The JSON API, the `/store` storefront and the `/console` admin pages,
//! exposed as a library so the binary, the CLI and tests share one router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::get,
};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{create_session_layer, request_id_middleware, security_headers_middleware};
use crate::services::upload::UPLOADS_PATH;
use crate::state::AppState;

/// Directory of CSS and other static assets, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/server/static";

/// Embedded migrations from `crates/server/migrations`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Build the full application router.
pub fn build_app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.pool(), state.config());

    let pages = Router::new()
        .nest("/store", routes::store::router())
        .nest("/console", routes::console::router())
        .layer(axum::middleware::from_fn(security_headers_middleware));

    Router::new()
        .route("/", get(|| async { Redirect::to("/store") }))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", routes::api_routes())
        .nest("/docs", openapi::router())
        .merge(pages)
        .nest_service(UPLOADS_PATH, ServeDir::new(&state.config().upload_dir))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness check. Does not touch dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness check: 503 until the database answers.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use mercado_core::OrderId;

    use crate::config::tests::test_config;
    use crate::routes::store::order_page_path;
    use crate::services::payments::NOTIFICATION_PATH;
    use crate::services::cep::CepClient;
    use crate::services::events::EventPublisher;

    /// An app whose pool never connects; only routes that reject before
    /// touching the database can be exercised.
    fn app() -> Router {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/mercado_test")
            .unwrap();
        let cep = CepClient::new(reqwest::Client::new(), &config.cep_api_base_url);
        let state = AppState::from_parts(config, pool, None, EventPublisher::disabled(), None, cep);
        build_app(state)
    }

    async fn send(method: Method, uri: &str) -> axum::response::Response {
        app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(Method::GET, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_api_requires_login() {
        for (method, uri) in [
            (Method::GET, "/api/cart"),
            (Method::GET, "/api/orders"),
            (Method::POST, "/api/orders"),
            (Method::GET, "/api/loyalty"),
            (Method::GET, "/api/addresses"),
            (Method::GET, "/api/wishlist"),
        ] {
            let response = send(method, uri).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_admin_api_requires_login() {
        for (method, uri) in [
            (Method::POST, "/api/products"),
            (Method::GET, "/api/admin/dashboard"),
            (Method::GET, "/api/analytics/sales"),
            (Method::PATCH, "/api/orders/1/status"),
        ] {
            let response = send(method, uri).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_pages_redirect_to_login() {
        for uri in ["/console", "/store/cart", "/store/account/orders"] {
            let response = send(Method::GET, uri).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/store/login");
        }
    }

    #[tokio::test]
    async fn test_advertised_gateway_urls_are_routed() {
        let config = test_config();
        let notification_url = config.url_for(NOTIFICATION_PATH);
        let path = notification_url.strip_prefix(&config.base_url).unwrap();

        // Without a configured gateway the handler answers 502, but it is reached
        let response = send(Method::POST, path).await;
        assert_ne!(response.status(), StatusCode::NOT_FOUND, "{path}");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = send(Method::GET, &order_page_path(OrderId::new(1))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/store/login");
    }

    #[tokio::test]
    async fn test_login_page_renders_with_security_headers() {
        let response = send(Method::GET, "/store/login").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::X_FRAME_OPTIONS).unwrap(), "DENY");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("action=\"/store/login\""));
    }

    #[tokio::test]
    async fn test_api_skips_page_headers() {
        let response = send(Method::GET, "/api/cart").await;
        assert!(response.headers().get(header::X_FRAME_OPTIONS).is_none());
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let response = send(Method::GET, "/docs/openapi.json").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
