//! Gateway-facing endpoints: raw charges, polling and the Asaas webhook.
//!
//! Raw charge and polling endpoints answer `{success:false, message}`
//! instead of an error status so the storefront can show the message.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use dermosul_core::Cents;

use crate::middleware::constant_time_compare;
use crate::services::checkout::{WebhookEvent, WebhookOutcome, qr_data_uri};
use crate::services::payments::{
    CardChargeRequest, CardDetails, PayerInfo, PaymentError, PixChargeRequest,
};
use crate::state::AppState;

const WEBHOOK_TOKEN_HEADER: &str = "asaas-access-token";
const CARD_FAILED: &str = "Failed to process payment.";
const PIX_FAILED: &str = "Failed to create PIX payment.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/payments/credit-card", post(credit_card))
        .route("/api/payments/pix", post(pix))
        .route(
            "/api/payments/status/by-reference/{reference}",
            get(status_by_reference),
        )
        .route("/api/gateway/asaas/webhook", post(webhook))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerRequest {
    pub name: String,
    pub email: String,
    pub cpf: String,
    #[serde(default)]
    pub phone: String,
    pub postal_code: Option<String>,
    pub address_number: Option<String>,
}

impl From<PayerRequest> for PayerInfo {
    fn from(payer: PayerRequest) -> Self {
        let digits = |s: &str| s.chars().filter(char::is_ascii_digit).collect::<String>();
        Self {
            name: payer.name.trim().to_string(),
            email: payer.email.trim().to_string(),
            cpf: digits(&payer.cpf),
            phone: digits(&payer.phone),
            postal_code: payer.postal_code.as_deref().map(digits),
            address_number: payer.address_number,
        }
    }
}

/// Body of the raw charge endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    /// Reais.
    pub amount: Decimal,
    pub customer: PayerRequest,
    pub credit_card: Option<CardDetails>,
    pub external_reference: String,
    pub installments: Option<u32>,
}

/// Answer of the raw charge and polling endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_paste: Option<String>,
}

impl GatewayResponse {
    fn failure(error: &PaymentError, fallback: &str) -> Self {
        tracing::warn!(error = %error, "Gateway call failed");
        Self {
            success: false,
            message: Some(error.message_or(fallback)),
            ..Self::default()
        }
    }
}

fn amount(value: Decimal) -> Result<Cents, PaymentError> {
    Cents::from_reais(value)
        .filter(|c| c.as_i64() > 0)
        .ok_or_else(|| PaymentError::Api {
            status: 400,
            message: "Valor inválido.".to_string(),
        })
}

/// `POST /api/payments/credit-card`
async fn credit_card(
    State(state): State<AppState>,
    Json(body): Json<ChargeRequest>,
) -> Json<GatewayResponse> {
    let request = match amount(body.amount) {
        Ok(amount) => CardChargeRequest {
            amount,
            external_reference: body.external_reference,
            installments: body.installments.unwrap_or(1).max(1),
            payer: body.customer.into(),
            card: body.credit_card,
        },
        Err(e) => return Json(GatewayResponse::failure(&e, CARD_FAILED)),
    };

    match state.payments().charge_card(&request).await {
        Ok(charge) => Json(GatewayResponse {
            success: true,
            gateway_payment_id: Some(charge.gateway_payment_id),
            status: Some(charge.status.to_string()),
            ..GatewayResponse::default()
        }),
        Err(e) => Json(GatewayResponse::failure(&e, CARD_FAILED)),
    }
}

/// `POST /api/payments/pix`
async fn pix(
    State(state): State<AppState>,
    Json(body): Json<ChargeRequest>,
) -> Json<GatewayResponse> {
    let request = match amount(body.amount) {
        Ok(amount) => PixChargeRequest {
            amount,
            external_reference: body.external_reference,
            payer: body.customer.into(),
        },
        Err(e) => return Json(GatewayResponse::failure(&e, PIX_FAILED)),
    };

    match state.payments().create_pix(&request).await {
        Ok(charge) => Json(GatewayResponse {
            success: true,
            gateway_payment_id: Some(charge.gateway_payment_id),
            status: Some(charge.status.to_string()),
            qr_code: Some(qr_data_uri(&charge.qr_code)),
            copy_paste: Some(charge.copy_paste),
            ..GatewayResponse::default()
        }),
        Err(e) => Json(GatewayResponse::failure(&e, PIX_FAILED)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub payment_id: Option<String>,
}

/// `GET /api/payments/status/by-reference/{reference}[?paymentId=]`
async fn status_by_reference(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match state
        .checkout()
        .reconcile(&reference, query.payment_id.as_deref())
        .await
    {
        Ok(result) => Json(GatewayResponse {
            success: result.success,
            paid: Some(result.paid),
            status: result.status,
            ..GatewayResponse::default()
        })
        .into_response(),
        Err(crate::error::AppError::Gateway(e)) => {
            Json(GatewayResponse::failure(&e, "Failed to check payment status.")).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Whether the webhook carries the configured token. No token configured
/// accepts every call.
fn webhook_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(WEBHOOK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| constant_time_compare(token, expected))
}

/// `POST /api/gateway/asaas/webhook`
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> (StatusCode, &'static str) {
    let expected = state
        .config()
        .asaas
        .webhook_token
        .as_ref()
        .map(|t| t.expose_secret().to_string());
    if !webhook_authorized(expected.as_deref(), &headers) {
        tracing::warn!("Webhook rejected: bad access token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook body is not a gateway event");
            return (StatusCode::BAD_REQUEST, "Invalid webhook payload");
        }
    };

    match state.checkout().handle_webhook(&event).await {
        Ok(WebhookOutcome::Paid(order_id)) => {
            tracing::info!(order_id = %order_id, "Order paid via webhook");
            (StatusCode::OK, "Webhook received")
        }
        Ok(WebhookOutcome::UnknownReference | WebhookOutcome::Ignored) => {
            (StatusCode::OK, "Webhook received")
        }
        Err(e) => {
            tracing::error!(error = %e, event = %event.event, "Error processing webhook");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error processing webhook")
        }
    }
}
