//! Admin back office: dashboard, users, orders and stores.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mercado_core::slug::{is_valid_slug, slugify};
use mercado_core::{OrderStatus, Price, Role, UserId};

use super::{optional_text, required_text};
use crate::db::orders::{Order, StatusCount};
use crate::db::stores::Store;
use crate::db::users::User;
use crate::db::{
    OrderRepository, Page, Pagination, ProductRepository, ReturnRepository, StoreRepository,
    SupportRepository, UserRepository,
};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Dashboard {
    pub users: i64,
    pub active_products: i64,
    pub orders_by_status: Vec<StatusCount>,
    pub open_tickets: i64,
    pub pending_returns: i64,
    /// Total of orders past payment, excluding cancelled ones.
    pub revenue: Price,
}

impl Dashboard {
    #[must_use]
    pub fn total_orders(&self) -> i64 {
        self.orders_by_status.iter().map(|row| row.count).sum()
    }
}

/// Gather the dashboard counters.
pub(crate) async fn load_dashboard(state: &AppState) -> Result<Dashboard> {
    let pool = state.pool();
    let orders = OrderRepository::new(pool);
    Ok(Dashboard {
        users: UserRepository::new(pool).count().await?,
        active_products: ProductRepository::new(pool).count_active().await?,
        orders_by_status: orders.count_by_status().await?,
        open_tickets: SupportRepository::new(pool).count_open().await?,
        pending_returns: ReturnRepository::new(pool).count_pending().await?,
        revenue: orders.revenue().await?,
    })
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Matches name or email.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderQuery {
    #[param(inline)]
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangeRole {
    pub role: Role,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateStore {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    /// Defaults to the admin creating the store.
    pub owner_id: Option<UserId>,
}

/// Admins may not remove their own admin role.
fn check_role_change(acting: UserId, target: UserId, role: Role) -> Result<()> {
    if acting == target && !role.is_admin() {
        return Err(AppError::BadRequest("You cannot remove your own admin role".to_string()));
    }
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/{id}/role", patch(change_role))
        .route("/orders", get(list_orders))
        .route("/stores", get(list_stores).post(create_store))
}

#[utoipa::path(
    get,
    path = "/admin/dashboard",
    tag = "admin",
    responses(
        (status = 200, description = "Counters and revenue", body = Dashboard),
        (status = 403, description = "Not an admin", body = ErrorBody),
    )
)]
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<AppJson<Dashboard>> {
    Ok(AppJson(load_dashboard(&state).await?))
}

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    params(UserQuery),
    responses((status = 200, description = "Users", body = Page<User>))
)]
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    AppQuery(query): AppQuery<UserQuery>,
) -> Result<AppJson<Page<User>>> {
    let pagination = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let (users, total) = UserRepository::new(state.pool())
        .list(query.q.as_deref(), pagination)
        .await?;
    Ok(AppJson(Page::new(users, pagination, total)))
}

#[utoipa::path(
    patch,
    path = "/admin/users/{id}/role",
    tag = "admin",
    params(("id" = i32, Path, description = "User ID")),
    request_body = ChangeRole,
    responses(
        (status = 200, description = "Role changed", body = User),
        (status = 400, description = "Cannot demote yourself", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
    )
)]
pub async fn change_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    AppJson(request): AppJson<ChangeRole>,
) -> Result<AppJson<User>> {
    check_role_change(admin.id, id, request.role)?;
    let user = UserRepository::new(state.pool()).set_role(id, request.role).await?;
    warn!(user_id = %id, role = %user.role, admin_id = %admin.id, "User role changed");
    Ok(AppJson(user))
}

#[utoipa::path(
    get,
    path = "/admin/orders",
    tag = "admin",
    params(OrderQuery),
    responses((status = 200, description = "All orders, newest first", body = Page<Order>))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    AppQuery(query): AppQuery<OrderQuery>,
) -> Result<AppJson<Page<Order>>> {
    let pagination = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let (orders, total) = OrderRepository::new(state.pool())
        .list_all(query.status, pagination)
        .await?;
    Ok(AppJson(Page::new(orders, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/admin/stores",
    tag = "admin",
    responses((status = 200, description = "Stores", body = Vec<Store>))
)]
pub async fn list_stores(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<AppJson<Vec<Store>>> {
    Ok(AppJson(StoreRepository::new(state.pool()).list().await?))
}

#[utoipa::path(
    post,
    path = "/admin/stores",
    tag = "admin",
    request_body = CreateStore,
    responses(
        (status = 201, description = "Created", body = Store),
        (status = 409, description = "Slug taken or owner missing", body = ErrorBody),
    )
)]
pub async fn create_store(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppJson(request): AppJson<CreateStore>,
) -> Result<(StatusCode, AppJson<Store>)> {
    let name = required_text("name", &request.name, 120)?;
    let slug = match request.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) if is_valid_slug(slug) => slug.to_string(),
        Some(_) => return Err(AppError::Validation("slug is not valid".to_string())),
        None => slugify(&name),
    };
    if slug.is_empty() {
        return Err(AppError::Validation("name must contain letters or digits".to_string()));
    }
    let description = optional_text("description", request.description.as_deref(), 2_000)?;
    let owner_id = request.owner_id.unwrap_or(admin.id);

    let store = StoreRepository::new(state.pool())
        .create(&name, &slug, description.as_deref(), owner_id)
        .await?;
    info!(store_id = %store.id, owner_id = %owner_id, "Store created");
    Ok((StatusCode::CREATED, AppJson(store)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cannot_demote_self() {
        let me = UserId::new(1);
        assert!(check_role_change(me, me, Role::Customer).is_err());
        assert!(check_role_change(me, me, Role::Admin).is_ok());
        assert!(check_role_change(me, UserId::new(2), Role::Customer).is_ok());
    }

    #[test]
    fn test_total_orders() {
        let dashboard = Dashboard {
            users: 3,
            active_products: 10,
            orders_by_status: vec![
                StatusCount {
                    status: OrderStatus::Pending,
                    count: 2,
                },
                StatusCount {
                    status: OrderStatus::Delivered,
                    count: 5,
                },
            ],
            open_tickets: 0,
            pending_returns: 1,
            revenue: Price::ZERO,
        };
        assert_eq!(dashboard.total_orders(), 7);
    }
}
