//! Dashboard endpoints over the last 14 days.

use axum::{Json, Router, extract::State, routing::get};
use chrono::{NaiveDate, Utc};

use crate::db::DashboardRepository;
use crate::db::dashboard::DashboardOrder;
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::services::dashboard::{
    self, CategoryCount, ConversionPoint, MethodAmount, Overview, RevenuePoint,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/overview", get(overview))
        .route("/api/revenueByDay", get(revenue_by_day))
        .route("/api/ordersByCategory", get(orders_by_category))
        .route("/api/conversionByDay", get(conversion_by_day))
        .route("/api/payments/breakdown", get(payments_breakdown))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn recent_orders(state: &AppState, today: NaiveDate) -> Result<Vec<DashboardOrder>> {
    Ok(DashboardRepository::new(state.pool())
        .orders_since(dashboard::window_start(today))
        .await?)
}

/// `GET /api/overview`
async fn overview(_admin: RequireAdmin, State(state): State<AppState>) -> Result<Json<Overview>> {
    let today = today();
    let orders = recent_orders(&state, today).await?;
    let payments = DashboardRepository::new(state.pool())
        .payments_by_method(dashboard::window_start(today))
        .await?;
    Ok(Json(dashboard::overview(&orders, &payments, today)))
}

/// `GET /api/revenueByDay`
async fn revenue_by_day(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<RevenuePoint>>> {
    let today = today();
    let orders = recent_orders(&state, today).await?;
    Ok(Json(dashboard::revenue_by_day(&orders, today)))
}

/// `GET /api/ordersByCategory`
async fn orders_by_category(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryCount>>> {
    let today = today();
    let orders = recent_orders(&state, today).await?;
    Ok(Json(dashboard::orders_by_category(&orders, today)))
}

/// `GET /api/conversionByDay`
async fn conversion_by_day(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversionPoint>>> {
    let today = today();
    let orders = recent_orders(&state, today).await?;
    Ok(Json(dashboard::conversion_by_day(&orders, today)))
}

/// `GET /api/payments/breakdown`
async fn payments_breakdown(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<MethodAmount>>> {
    let totals = DashboardRepository::new(state.pool())
        .payments_by_method(dashboard::window_start(today()))
        .await?;
    Ok(Json(dashboard::breakdown(&totals)))
}
