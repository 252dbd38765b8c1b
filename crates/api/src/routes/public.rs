//! Storefront endpoints: order creation, checkout and order status.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::db::OrderRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::{OrderView, PublicOrderRequest};
use crate::services::checkout::ChargeOutcome;
use crate::services::order_status::{self, OrderLookup, OrderStatusView};
use crate::services::payments::CardDetails;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders/public", post(create_order))
        .route("/api/orders/lookup", get(lookup))
        .route("/api/orders/{id}/status", get(status))
        .route("/api/checkout", post(checkout))
}

/// `POST /api/orders/public`
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<PublicOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>)> {
    let new_order = request.validate().map_err(AppError::Validation)?;
    let details = OrderRepository::new(state.pool())
        .create_public(&new_order)
        .await?;

    tracing::info!(order_id = %details.order.id, "Public order created");
    add_breadcrumb("order", "Public order created", &[("order_id", details.order.id.as_str())]);
    Ok((StatusCode::CREATED, Json(OrderView::from(&details))))
}

/// Order fields plus the card used to pay.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub order: PublicOrderRequest,
    pub credit_card: Option<CardDetails>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: OrderView,
    pub charge: ChargeOutcome,
}

/// `POST /api/checkout`
///
/// Creates the order and charges it. A refused charge leaves the order
/// cancelled and answers with the gateway error.
async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    let new_order = request.order.validate().map_err(AppError::Validation)?;
    let repo = OrderRepository::new(state.pool());
    let details = repo.create_public(&new_order).await?;
    tracing::info!(order_id = %details.order.id, method = %new_order.payment_method, "Checkout started");

    let checkout = state.checkout();
    let charge = checkout
        .charge(&details, request.credit_card.as_ref())
        .await?;

    let details = repo
        .get(&details.order.id)
        .await?
        .ok_or_else(|| AppError::Internal("order vanished after charge".to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order: OrderView::from(&details),
            charge,
        }),
    ))
}

/// `GET /api/orders/{id}/status`
///
/// `id` may be the order id or its external reference.
async fn status(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<OrderStatusView>> {
    order_status::resolve(state.pool(), &code)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Pedido não encontrado.".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub message: Option<String>,
}

/// `GET /api/orders/lookup?message=`
async fn lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<OrderLookup>> {
    let message = query
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest("Parâmetro message é obrigatório.".to_string()))?;

    Ok(Json(order_status::resolve_message(state.pool(), message).await?))
}
