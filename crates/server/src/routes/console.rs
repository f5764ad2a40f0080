//! Admin console pages under `/console`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::State,
    routing::get,
};

use super::admin::{Dashboard, OrderQuery, load_dashboard};
use crate::db::orders::Order;
use crate::db::{OrderRepository, Page, Pagination};
use crate::error::Result;
use crate::extract::AppQuery;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::CurrentUser;
use crate::state::AppState;

use mercado_core::OrderStatus;

#[derive(Template, WebTemplate)]
#[template(path = "console/dashboard.html")]
pub struct DashboardTemplate {
    pub user: Option<CurrentUser>,
    pub dashboard: Dashboard,
}

#[derive(Template, WebTemplate)]
#[template(path = "console/orders.html")]
pub struct OrdersTemplate {
    pub user: Option<CurrentUser>,
    pub page: Page<Order>,
    pub status: Option<OrderStatus>,
    /// `status=...&` prefix carried into pager links.
    pub status_param: String,
    pub total_pages: i64,
    pub has_next: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/orders", get(orders))
}

pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<DashboardTemplate> {
    Ok(DashboardTemplate {
        dashboard: load_dashboard(&state).await?,
        user: Some(admin),
    })
}

pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppQuery(query): AppQuery<OrderQuery>,
) -> Result<OrdersTemplate> {
    let pagination = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let (items, total) = OrderRepository::new(state.pool())
        .list_all(query.status, pagination)
        .await?;
    let page = Page::new(items, pagination, total);
    let total_pages = page.total_pages();

    Ok(OrdersTemplate {
        user: Some(admin),
        status_param: status_param(query.status),
        status: query.status,
        has_next: i64::from(page.page) < total_pages,
        total_pages,
        page,
    })
}

fn status_param(status: Option<OrderStatus>) -> String {
    status.map(|s| format!("status={s}&")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_param() {
        assert_eq!(status_param(None), "");
        assert_eq!(
            status_param(Some(OrderStatus::PartiallyRefunded)),
            "status=partially_refunded&"
        );
    }
}
