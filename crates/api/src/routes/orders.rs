//! Admin order endpoints: listing, CSV export, detail, edits and notes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dermosul_core::{OrderId, OrderStatus, PaymentMethod};

use crate::db::{CustomerRepository, NoteRepository, OrderFilter, OrderRepository, OrderSort};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{FieldErrors, OrderDetails, OrderPatch, OrderView};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const EXPORT_FILENAME: &str = "pedidos.csv";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(list))
        .route("/api/orders/export", get(export))
        .route("/api/orders/{id}", get(show).patch(update).delete(destroy))
        .route("/api/orders/{id}/notes", get(notes).patch(set_notes))
}

/// Query string of the order list and export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn positive(value: Option<&String>, default: i64) -> i64 {
    present(value)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

fn date(value: Option<&String>, field: &str) -> Result<Option<NaiveDate>> {
    present(value)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(format!("{field} deve estar no formato YYYY-MM-DD.")))
        })
        .transpose()
}

impl ListQuery {
    /// Filters of the query.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an unknown status or a malformed
    /// date.
    pub fn filter(&self) -> Result<OrderFilter> {
        let status = present(self.status.as_ref())
            .map(|raw| {
                raw.parse::<OrderStatus>()
                    .map_err(|_| AppError::BadRequest(format!("Status inválido: {raw}")))
            })
            .transpose()?;

        Ok(OrderFilter {
            status,
            category: present(self.category.as_ref()).map(str::to_string),
            date_from: date(self.date_from.as_ref(), "dateFrom")?,
            date_to: date(self.date_to.as_ref(), "dateTo")?,
            q: present(self.q.as_ref()).map(str::to_string),
            sort: present(self.sort.as_ref()).map_or_else(OrderSort::default, OrderSort::parse),
        })
    }

    #[must_use]
    pub fn page(&self) -> i64 {
        positive(self.page.as_ref(), 1)
    }

    #[must_use]
    pub fn page_size(&self) -> i64 {
        positive(self.page_size.as_ref(), DEFAULT_PAGE_SIZE)
    }
}

/// One page of orders.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub items: Vec<OrderView>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Page count, never below one.
#[must_use]
pub fn total_pages(total: i64, page_size: i64) -> i64 {
    let size = page_size.max(1);
    ((total + size - 1) / size).max(1)
}

fn not_found(id: &OrderId) -> AppError {
    AppError::NotFound(format!("Pedido {id} não encontrado."))
}

async fn load(state: &AppState, id: &OrderId) -> Result<OrderDetails> {
    OrderRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// `GET /api/orders`
async fn list(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<OrderPage>> {
    let filter = query.filter()?;
    let (page, page_size) = (query.page(), query.page_size());

    let (orders, total) = OrderRepository::new(state.pool())
        .list(&filter, page, page_size)
        .await?;

    Ok(Json(OrderPage {
        items: orders.iter().map(OrderView::from).collect(),
        total,
        page,
        page_size,
        total_pages: total_pages(total, page_size),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow<'a> {
    created_at: &'a str,
    id: &'a str,
    full_id: &'a str,
    client: &'a str,
    category: &'a str,
    status: OrderStatus,
    total: f64,
    payment_method: PaymentMethod,
    lp_status: &'a str,
}

/// Render orders as CSV with a header row.
///
/// # Errors
///
/// Returns `AppError::Internal` if serialization fails.
pub fn orders_csv(orders: &[OrderView]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for view in orders {
        writer
            .serialize(CsvRow {
                created_at: &view.created_at,
                id: &view.id,
                full_id: &view.full_id,
                client: &view.client,
                category: &view.category,
                status: view.status,
                total: view.total,
                payment_method: view.payment_method,
                lp_status: view.lp_status.as_deref().unwrap_or_default(),
            })
            .map_err(|e| AppError::Internal(format!("CSV export failed: {e}")))?;
    }
    if orders.is_empty() {
        writer
            .write_record([
                "createdAt",
                "id",
                "fullId",
                "client",
                "category",
                "status",
                "total",
                "paymentMethod",
                "lpStatus",
            ])
            .map_err(|e| AppError::Internal(format!("CSV export failed: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export failed: {e}")))
}

/// `GET /api/orders/export`
async fn export(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let filter = query.filter()?;
    let orders = OrderRepository::new(state.pool()).list_all(&filter).await?;
    let views: Vec<OrderView> = orders.iter().map(OrderView::from).collect();
    let body = orders_csv(&views)?;

    tracing::info!(rows = views.len(), "Orders exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        body,
    ))
}

/// `GET /api/orders/{id}`
async fn show(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>> {
    let details = load(&state, &OrderId::new(id)).await?;
    Ok(Json(OrderView::from(&details)))
}

/// `PATCH /api/orders/{id}`
///
/// Status changes go through the checkout service so payments follow the
/// order and the customer gets the matching e-mail.
async fn update(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<OrderPatch>,
) -> Result<Json<OrderView>> {
    let id = OrderId::new(id);
    let mut update = patch.resolve().map_err(AppError::Validation)?;
    let details = load(&state, &id).await?;

    let touches_customer = !update.customer.is_empty() || update.shipping.is_some();
    match (&details.customer, touches_customer) {
        (Some(customer), true) => {
            let customers = CustomerRepository::new(state.pool());
            customers.update(customer.id, &update.customer).await?;
            if let Some(shipping) = &update.shipping {
                customers.upsert_address(customer.id, shipping).await?;
            }
        }
        (None, true) => {
            return Err(AppError::BadRequest("Pedido sem cliente.".to_string()));
        }
        _ => {}
    }

    let status = update.status.take();
    OrderRepository::new(state.pool()).update(&id, &update).await?;

    let details = match status {
        Some(status) => state.checkout().apply_status(&id, status).await?,
        None => load(&state, &id).await?,
    };

    tracing::info!(order_id = %id, "Order updated");
    Ok(Json(OrderView::from(&details)))
}

/// `DELETE /api/orders/{id}`
async fn destroy(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = OrderId::new(id);
    OrderRepository::new(state.pool())
        .delete(&id)
        .await
        .map_err(|e| match e {
            crate::db::RepositoryError::NotFound => not_found(&id),
            other => other.into(),
        })?;

    tracing::info!(order_id = %id, "Order deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct NotesResponse {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Value,
}

impl NotesRequest {
    /// The notes text.
    ///
    /// # Errors
    ///
    /// Returns the field error when `notes` is not a string.
    pub fn text(&self) -> std::result::Result<&str, FieldErrors> {
        self.notes.as_str().ok_or_else(|| {
            FieldErrors::from([(
                "notes".to_string(),
                "Notas devem ser um texto.".to_string(),
            )])
        })
    }
}

/// `GET /api/orders/{id}/notes`
async fn notes(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NotesResponse>> {
    let id = OrderId::new(id);
    load(&state, &id).await?;
    let notes = NoteRepository::new(state.pool()).get(&id).await?;
    Ok(Json(NotesResponse { notes }))
}

/// `PATCH /api/orders/{id}/notes`
async fn set_notes(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NotesRequest>,
) -> Result<Json<NotesResponse>> {
    let text = body.text().map_err(AppError::Validation)?;
    let id = OrderId::new(id);
    load(&state, &id).await?;
    NoteRepository::new(state.pool()).set(&id, text).await?;
    Ok(Json(NotesResponse {
        notes: text.to_string(),
    }))
}
