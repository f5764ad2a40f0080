//! Server-rendered storefront under `/store`.
//!
//! Pages read through the same repositories and services as the JSON API.
//! Form posts answer with a redirect; failures come back as an `?error=`
//! code that the target page turns into a message.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, warn};

use mercado_core::{OrderId, ProductId};

use super::auth::start_session;
use super::products::{ProductDetail, ProductQuery, load_detail};
use crate::db::addresses::AddressSnapshot;
use crate::db::orders::Order;
use crate::db::products::ProductListing;
use crate::db::reviews::Review;
use crate::db::tracking::TrackingEvent;
use crate::db::{
    OrderRepository, Page, Pagination, ProductRepository, ReviewRepository, TrackingRepository,
};
use crate::error::{AppError, Result, clear_sentry_user};
use crate::extract::AppQuery;
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth, clear_current_user};
use crate::models::CurrentUser;
use crate::services::auth::{AuthError, AuthService};
use crate::services::cart::{AddToCart, CartService, CartView};
use crate::services::email::OutgoingEmail;
use crate::services::orders::{OrderDetail, OrderService};
use crate::state::AppState;

/// Products shown on the home page.
const HOME_PRODUCTS: i64 = 8;

/// Path of a customer's order page.
#[must_use]
pub fn order_page_path(id: OrderId) -> String {
    format!("/store/account/orders/{id}")
}

// =============================================================================
// Form Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveForm {
    pub product_id: ProductId,
}

/// Query parameters for error display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
}

impl MessageQuery {
    fn message(&self) -> Option<&'static str> {
        self.error.as_deref().map(error_message)
    }
}

/// Text shown for an `?error=` code.
fn error_message(code: &str) -> &'static str {
    match code {
        "credentials" => "Email or password is incorrect.",
        "email_taken" => "An account with this email already exists.",
        "password_mismatch" => "Passwords do not match.",
        "weak_password" => "Password must be at least 8 characters.",
        "invalid_email" => "Enter a valid email address.",
        "invalid_name" => "Enter your name.",
        "unavailable" => "That product is unavailable or out of stock.",
        "quantity" => "Choose between 1 and 99 units.",
        _ => "Something went wrong. Please try again.",
    }
}

/// Map an authentication failure to an `?error=` code.
const fn auth_error_code(err: &AuthError) -> &'static str {
    match err {
        AuthError::InvalidCredentials | AuthError::UserNotFound => "credentials",
        AuthError::UserAlreadyExists => "email_taken",
        AuthError::WeakPassword(_) => "weak_password",
        AuthError::InvalidEmail(_) => "invalid_email",
        AuthError::InvalidName => "invalid_name",
        AuthError::Repository(_) | AuthError::PasswordHash => "failed",
    }
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Template, WebTemplate)]
#[template(path = "store/home.html")]
pub struct HomeTemplate {
    pub user: Option<CurrentUser>,
    pub latest: Vec<ProductListing>,
}

#[derive(Template, WebTemplate)]
#[template(path = "store/products.html")]
pub struct ProductsTemplate {
    pub user: Option<CurrentUser>,
    pub page: Page<ProductListing>,
    pub search: String,
    pub total_pages: i64,
    pub has_next: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "store/product.html")]
pub struct ProductTemplate {
    pub user: Option<CurrentUser>,
    pub detail: ProductDetail,
    pub reviews: Vec<Review>,
}

#[derive(Template, WebTemplate)]
#[template(path = "store/cart.html")]
pub struct CartTemplate {
    pub user: Option<CurrentUser>,
    pub cart: CartView,
    pub error: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "store/login.html")]
pub struct LoginTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "store/register.html")]
pub struct RegisterTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "store/orders.html")]
pub struct OrdersTemplate {
    pub user: Option<CurrentUser>,
    pub page: Page<Order>,
    pub total_pages: i64,
    pub has_next: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "store/order.html")]
pub struct OrderTemplate {
    pub user: Option<CurrentUser>,
    pub detail: OrderDetail,
    pub address: AddressSnapshot,
    pub events: Vec<TrackingEvent>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/products", get(products))
        .route("/products/{id}", get(product))
        .route("/cart", get(cart))
        .route("/cart/add", post(cart_add))
        .route("/cart/remove", post(cart_remove))
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/logout", post(logout))
        .route("/account/orders", get(orders))
        .route("/account/orders/{id}", get(order))
}

// =============================================================================
// Catalog
// =============================================================================

pub async fn home(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> Result<HomeTemplate> {
    let latest = ProductRepository::new(state.pool()).latest(HOME_PRODUCTS).await?;
    Ok(HomeTemplate { user, latest })
}

pub async fn products(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    AppQuery(query): AppQuery<ProductQuery>,
) -> Result<ProductsTemplate> {
    let filter = query.filter();
    let pagination = query.pagination();
    let (items, total) = ProductRepository::new(state.pool())
        .list(&filter, pagination)
        .await?;
    let page = Page::new(items, pagination, total);
    let total_pages = page.total_pages();

    Ok(ProductsTemplate {
        user,
        has_next: i64::from(page.page) < total_pages,
        total_pages,
        page,
        search: filter.search.unwrap_or_default(),
    })
}

pub async fn product(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
) -> Result<ProductTemplate> {
    let detail = load_detail(&state, id, false).await?;
    let reviews = ReviewRepository::new(state.pool()).list_for_product(id).await?;
    Ok(ProductTemplate {
        user,
        detail,
        reviews,
    })
}

// =============================================================================
// Cart
// =============================================================================

pub async fn cart(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<MessageQuery>,
) -> Result<CartTemplate> {
    let cart = CartService::new(state.pool()).view(user.id).await?;
    Ok(CartTemplate {
        error: query.message(),
        user: Some(user),
        cart,
    })
}

pub async fn cart_add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<AddToCart>,
) -> Redirect {
    match CartService::new(state.pool()).add(user.id, &form).await {
        Ok(_) => Redirect::to("/store/cart"),
        Err(AppError::Validation(_)) => Redirect::to("/store/cart?error=quantity"),
        Err(e) => {
            warn!(user_id = %user.id, product_id = %form.product_id, error = %e, "Add to cart failed");
            Redirect::to("/store/cart?error=unavailable")
        }
    }
}

pub async fn cart_remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<RemoveForm>,
) -> Result<Redirect> {
    CartService::new(state.pool()).remove(user.id, form.product_id).await?;
    Ok(Redirect::to("/store/cart"))
}

// =============================================================================
// Login / Registration
// =============================================================================

pub async fn login_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        user: None,
        error: query.message(),
    }
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Login failed");
            return Redirect::to(&format!("/store/login?error={}", auth_error_code(&e)))
                .into_response();
        }
    };

    if let Err(e) = start_session(&session, &user).await {
        tracing::error!(error = %e, "Failed to set session");
        return Redirect::to("/store/login?error=session").into_response();
    }

    info!(user_id = %user.id, "User logged in");
    Redirect::to("/store").into_response()
}

pub async fn register_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    RegisterTemplate {
        user: None,
        error: query.message(),
    }
}

pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.password_confirm {
        return Redirect::to("/store/register?error=password_mismatch").into_response();
    }

    let user = match AuthService::new(state.pool())
        .register(&form.email, &form.password, &form.name)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Registration failed");
            return Redirect::to(&format!("/store/register?error={}", auth_error_code(&e)))
                .into_response();
        }
    };

    if let Err(e) = start_session(&session, &user).await {
        tracing::error!(error = %e, "Failed to set session");
        return Redirect::to("/store/login?error=session").into_response();
    }
    state.notify(OutgoingEmail::Welcome {
        to: user.email.to_string(),
        name: user.name.clone(),
    });

    info!(user_id = %user.id, "User registered");
    Redirect::to("/store").into_response()
}

pub async fn logout(session: Session) -> Result<Redirect> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Redirect::to("/store"))
}

// =============================================================================
// Account
// =============================================================================

pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(pagination): Query<Pagination>,
) -> Result<OrdersTemplate> {
    let (items, total) = OrderRepository::new(state.pool())
        .list_for_user(user.id, pagination)
        .await?;
    let page = Page::new(items, pagination, total);
    let total_pages = page.total_pages();

    Ok(OrdersTemplate {
        user: Some(user),
        has_next: i64::from(page.page) < total_pages,
        total_pages,
        page,
    })
}

/// Linked from order emails and from the payment gateway's return redirect.
pub async fn order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<OrderTemplate> {
    let detail = OrderService::new(&state).get_for_viewer(&user, id).await?;
    let events = TrackingRepository::new(state.pool())
        .events(detail.order.id)
        .await?;

    Ok(OrderTemplate {
        user: Some(user),
        address: detail.order.shipping_address.0.clone(),
        detail,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_page_path() {
        assert_eq!(order_page_path(OrderId::new(7)), "/store/account/orders/7");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(error_message("credentials"), "Email or password is incorrect.");
        assert_eq!(error_message("session"), "Something went wrong. Please try again.");

        let query = MessageQuery {
            error: Some("password_mismatch".to_string()),
        };
        assert_eq!(query.message(), Some("Passwords do not match."));
        assert_eq!(MessageQuery { error: None }.message(), None);
    }

    #[test]
    fn test_auth_error_codes() {
        assert_eq!(auth_error_code(&AuthError::InvalidCredentials), "credentials");
        assert_eq!(auth_error_code(&AuthError::UserAlreadyExists), "email_taken");
        assert_eq!(
            auth_error_code(&AuthError::WeakPassword("short".to_string())),
            "weak_password"
        );
        assert_eq!(auth_error_code(&AuthError::PasswordHash), "failed");
    }
}
