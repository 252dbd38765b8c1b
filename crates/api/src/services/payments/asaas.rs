//! Asaas REST client.
//!
//! # API Reference
//!
//! - Base URL: `ASAAS_API_BASE` (sandbox: `https://sandbox.asaas.com/api/v3`)
//! - Authentication: `access_token: <key>` header
//! - Amounts are decimal reais; dates are `YYYY-MM-DD`

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::instrument;

use crate::config::AsaasConfig;

use super::{
    CardChargeRequest, Charge, GatewayStatus, NOT_APPROVED, PayerInfo, PaymentError,
    PaymentLookup, PaymentProvider, PixCharge, PixChargeRequest,
};

/// Postal code sent when the buyer's is unknown. Asaas requires one.
const FALLBACK_POSTAL_CODE: &str = "01153000";
/// Address number sent when the buyer's is unknown.
const FALLBACK_ADDRESS_NUMBER: &str = "123";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewCustomer<'a> {
    name: &'a str,
    email: &'a str,
    mobile_phone: &'a str,
    cpf_cnpj: &'a str,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreditCardBody<'a> {
    holder_name: &'a str,
    number: String,
    expiry_month: &'a str,
    expiry_year: &'a str,
    ccv: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HolderInfoBody<'a> {
    name: &'a str,
    email: &'a str,
    cpf_cnpj: &'a str,
    postal_code: &'a str,
    address_number: &'a str,
    phone: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPayment<'a> {
    customer: &'a str,
    billing_type: &'static str,
    due_date: String,
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    description: String,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    credit_card: Option<CreditCardBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credit_card_holder_info: Option<HolderInfoBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    installment_count: Option<u32>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    installment_value: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PaymentRecord {
    id: String,
    status: String,
}

impl From<PaymentRecord> for PaymentLookup {
    fn from(record: PaymentRecord) -> Self {
        Self {
            gateway_payment_id: Some(record.id),
            status: Some(GatewayStatus::new(record.status)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PixQrCode {
    encoded_image: String,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: String,
}

fn card_payment_body<'a>(
    customer: &'a str,
    request: &'a CardChargeRequest,
    today: NaiveDate,
) -> Result<NewPayment<'a>, PaymentError> {
    let card = request.card.as_ref().ok_or(PaymentError::MissingCard)?;
    let payer = &request.payer;
    let installments = (request.installments > 1).then_some(request.installments);

    Ok(NewPayment {
        customer,
        billing_type: "CREDIT_CARD",
        due_date: today.format("%Y-%m-%d").to_string(),
        value: request.amount.to_reais(),
        description: format!("Pedido {}", request.external_reference),
        external_reference: &request.external_reference,
        credit_card: Some(CreditCardBody {
            holder_name: &card.holder_name,
            number: card.digits(),
            expiry_month: &card.expiry_month,
            expiry_year: &card.expiry_year,
            ccv: &card.cvv,
        }),
        credit_card_holder_info: Some(HolderInfoBody {
            name: &payer.name,
            email: &payer.email,
            cpf_cnpj: &payer.cpf,
            postal_code: payer
                .postal_code
                .as_deref()
                .unwrap_or(FALLBACK_POSTAL_CODE),
            address_number: payer
                .address_number
                .as_deref()
                .unwrap_or(FALLBACK_ADDRESS_NUMBER),
            phone: &payer.phone,
        }),
        installment_count: installments,
        installment_value: installments.map(|n| request.amount.installment_value(n)),
    })
}

fn pix_payment_body<'a>(
    customer: &'a str,
    request: &'a PixChargeRequest,
    today: NaiveDate,
) -> NewPayment<'a> {
    NewPayment {
        customer,
        billing_type: "PIX",
        due_date: today.format("%Y-%m-%d").to_string(),
        value: request.amount.to_reais(),
        description: format!("Pedido PIX {}", request.external_reference),
        external_reference: &request.external_reference,
        credit_card: None,
        credit_card_holder_info: None,
        installment_count: None,
        installment_value: None,
    }
}

// =============================================================================
// Client
// =============================================================================

/// Asaas API client.
#[derive(Clone)]
pub struct AsaasClient {
    inner: Arc<AsaasClientInner>,
}

struct AsaasClientInner {
    client: reqwest::Client,
    base_url: String,
}

impl AsaasClient {
    /// Create a new Asaas API client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &AsaasConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "access_token",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| PaymentError::Parse(format!("Invalid API key format: {e}")))?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(AsaasClientInner {
                client,
                base_url: config.api_base.trim_end_matches('/').to_string(),
            }),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PaymentError> {
        let url = format!("{}{path}", self.inner.base_url);
        let response = self.inner.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PaymentError> {
        let url = format!("{}{path}", self.inner.base_url);
        let response = self.inner.client.post(&url).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|e| PaymentError::Parse(format!("Failed to parse response: {e}")));
        }

        Err(self.parse_error(response).await)
    }

    /// Map an error response, keeping the first `errors[].description`.
    async fn parse_error(&self, response: reqwest::Response) -> PaymentError {
        let status = response.status().as_u16();

        match status {
            429 => return PaymentError::RateLimited,
            401 | 403 => return PaymentError::Unauthorized,
            404 => return PaymentError::NotFound("Resource not found".to_string()),
            _ => {}
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status, body = %body, "Asaas request failed");

        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.errors.into_iter().next())
            .map(|e| e.description)
            .unwrap_or_default();

        PaymentError::Api { status, message }
    }

    async fn create_payment(&self, body: &NewPayment<'_>) -> Result<PaymentRecord, PaymentError> {
        self.post("/payments", body).await
    }
}

#[async_trait]
impl PaymentProvider for AsaasClient {
    #[instrument(skip(self, payer))]
    async fn find_or_create_customer(&self, payer: &PayerInfo) -> Result<String, PaymentError> {
        let lookup = async {
            let path = format!("/customers?cpfCnpj={}", urlencoding::encode(&payer.cpf));
            let existing: Page<Record> = self.get(&path).await?;
            if let Some(customer) = existing.data.into_iter().next() {
                return Ok(customer.id);
            }

            let created: Record = self
                .post(
                    "/customers",
                    &NewCustomer {
                        name: &payer.name,
                        email: &payer.email,
                        mobile_phone: &payer.phone,
                        cpf_cnpj: &payer.cpf,
                    },
                )
                .await?;
            tracing::info!(customer_id = %created.id, "Created Asaas customer");
            Ok::<_, PaymentError>(created.id)
        };

        lookup.await.map_err(|e| {
            tracing::error!(error = %e, "Asaas customer lookup failed");
            PaymentError::Customer(Box::new(e))
        })
    }

    #[instrument(skip(self, request), fields(reference = %request.external_reference))]
    async fn charge_card(&self, request: &CardChargeRequest) -> Result<Charge, PaymentError> {
        if request.card.is_none() {
            return Err(PaymentError::MissingCard);
        }

        let customer = self.find_or_create_customer(&request.payer).await?;
        let body = card_payment_body(&customer, request, Utc::now().date_naive())?;
        let record = self.create_payment(&body).await?;
        let status = GatewayStatus::new(record.status);

        if !status.is_approved() {
            tracing::warn!(
                gateway_payment_id = %record.id,
                gateway_status = %status,
                "Card payment not approved"
            );
            return Err(PaymentError::Declined(NOT_APPROVED.to_string()));
        }

        tracing::info!(gateway_payment_id = %record.id, gateway_status = %status, "Card payment accepted");
        Ok(Charge {
            gateway_payment_id: record.id,
            status,
        })
    }

    #[instrument(skip(self, request), fields(reference = %request.external_reference))]
    async fn create_pix(&self, request: &PixChargeRequest) -> Result<PixCharge, PaymentError> {
        let customer = self.find_or_create_customer(&request.payer).await?;
        let body = pix_payment_body(&customer, request, Utc::now().date_naive());
        let record = self.create_payment(&body).await?;

        let qr: PixQrCode = self
            .get(&format!("/payments/{}/pixQrCode", record.id))
            .await?;

        tracing::info!(gateway_payment_id = %record.id, "PIX charge created");
        Ok(PixCharge {
            gateway_payment_id: record.id,
            status: GatewayStatus::new(GatewayStatus::PENDING),
            qr_code: qr.encoded_image,
            copy_paste: qr.payload,
        })
    }

    #[instrument(skip(self))]
    async fn status_by_reference(&self, reference: &str) -> Result<PaymentLookup, PaymentError> {
        let path = format!(
            "/payments?externalReference={}",
            urlencoding::encode(reference)
        );
        let page: Page<PaymentRecord> = self.get(&path).await?;
        Ok(page
            .data
            .into_iter()
            .next()
            .map(PaymentLookup::from)
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn status_by_id(&self, payment_id: &str) -> Result<PaymentLookup, PaymentError> {
        let path = format!("/payments/{}", urlencoding::encode(payment_id));
        match self.get::<PaymentRecord>(&path).await {
            Ok(record) => Ok(record.into()),
            Err(PaymentError::NotFound(_)) => Ok(PaymentLookup::default()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for AsaasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsaasClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::{HeaderMap as AxumHeaders, StatusCode},
        routing::get,
    };
    use dermosul_core::Cents;
    use secrecy::SecretString;
    use serde_json::{Value, json};

    use super::*;
    use crate::services::payments::CardDetails;

    fn payer() -> PayerInfo {
        PayerInfo {
            name: "Ana Souza".to_string(),
            email: "ana.souza@example.com".to_string(),
            cpf: "52998224725".to_string(),
            phone: "11987654321".to_string(),
            postal_code: None,
            address_number: None,
        }
    }

    fn card() -> CardDetails {
        CardDetails {
            holder_name: "ANA SOUZA".to_string(),
            number: "5162 3060 1234 5678".to_string(),
            expiry_month: "05".to_string(),
            expiry_year: "2030".to_string(),
            cvv: "318".to_string(),
        }
    }

    fn card_request(installments: u32) -> CardChargeRequest {
        CardChargeRequest {
            amount: Cents::new(29_980),
            external_reference: "lp-serum-1710429000".to_string(),
            installments,
            payer: payer(),
            card: Some(card()),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_card_body_shape() {
        let request = card_request(1);
        let body = serde_json::to_value(card_payment_body("cus_1", &request, today()).unwrap())
            .unwrap();

        assert_eq!(body["customer"], "cus_1");
        assert_eq!(body["billingType"], "CREDIT_CARD");
        assert_eq!(body["dueDate"], "2026-03-14");
        assert_eq!(body["value"], 299.8);
        assert_eq!(body["description"], "Pedido lp-serum-1710429000");
        assert_eq!(body["creditCard"]["number"], "5162306012345678");
        assert_eq!(body["creditCard"]["ccv"], "318");
        assert_eq!(body["creditCardHolderInfo"]["postalCode"], "01153000");
        assert_eq!(body["creditCardHolderInfo"]["addressNumber"], "123");
        assert!(body.get("installmentCount").is_none());
        assert!(body.get("installmentValue").is_none());
    }

    #[test]
    fn test_card_body_installments() {
        let request = card_request(3);
        let body = serde_json::to_value(card_payment_body("cus_1", &request, today()).unwrap())
            .unwrap();
        assert_eq!(body["installmentCount"], 3);
        assert_eq!(body["installmentValue"], 99.93);
    }

    #[test]
    fn test_card_body_uses_known_address() {
        let mut request = card_request(1);
        request.payer.postal_code = Some("90010000".to_string());
        request.payer.address_number = Some("45".to_string());
        let body = serde_json::to_value(card_payment_body("cus_1", &request, today()).unwrap())
            .unwrap();
        assert_eq!(body["creditCardHolderInfo"]["postalCode"], "90010000");
        assert_eq!(body["creditCardHolderInfo"]["addressNumber"], "45");
    }

    #[test]
    fn test_pix_body_shape() {
        let request = PixChargeRequest {
            amount: Cents::new(14_990),
            external_reference: "lp-1".to_string(),
            payer: payer(),
        };
        let body = serde_json::to_value(pix_payment_body("cus_1", &request, today())).unwrap();
        assert_eq!(body["billingType"], "PIX");
        assert_eq!(body["description"], "Pedido PIX lp-1");
        assert_eq!(body["value"], 149.9);
        assert!(body.get("creditCard").is_none());
    }

    // -------------------------------------------------------------------------
    // Against a local fake gateway
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct Fake {
        existing_customer: bool,
        payment_status: String,
        reject_with: Option<String>,
        posted: Mutex<Vec<(String, Value)>>,
    }

    type Shared = Arc<Fake>;

    async fn list_customers(State(fake): State<Shared>) -> Json<Value> {
        if fake.existing_customer {
            Json(json!({"data": [{"id": "cus_existing"}]}))
        } else {
            Json(json!({"data": []}))
        }
    }

    async fn create_customer(State(fake): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        fake.posted
            .lock()
            .unwrap()
            .push(("/customers".to_string(), body));
        Json(json!({"id": "cus_new"}))
    }

    async fn create_payment(
        State(fake): State<Shared>,
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        assert_eq!(headers["access_token"], "aact_test_key");
        fake.posted
            .lock()
            .unwrap()
            .push(("/payments".to_string(), body));
        if let Some(description) = &fake.reject_with {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"errors": [{"code": "invalid_creditCard", "description": description}]})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({"id": "pay_123", "status": fake.payment_status})),
        )
    }

    async fn list_payments(Query(query): Query<std::collections::HashMap<String, String>>) -> Json<Value> {
        if query.get("externalReference").map(String::as_str) == Some("lp-paid") {
            Json(json!({"data": [{"id": "pay_9", "status": "RECEIVED"}]}))
        } else {
            Json(json!({"data": []}))
        }
    }

    async fn pix_qr(Path(id): Path<String>) -> Json<Value> {
        Json(json!({"encodedImage": format!("iVBOR-{id}"), "payload": "00020126pix"}))
    }

    async fn payment_by_id(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
        if id == "pay_9" {
            (StatusCode::OK, Json(json!({"id": "pay_9", "status": "CONFIRMED"})))
        } else {
            (StatusCode::NOT_FOUND, Json(json!({})))
        }
    }

    async fn spawn(fake: Fake) -> (AsaasClient, Shared) {
        let shared = Arc::new(fake);
        let app = Router::new()
            .route("/customers", get(list_customers).post(create_customer))
            .route("/payments", get(list_payments).post(create_payment))
            .route("/payments/{id}", get(payment_by_id))
            .route("/payments/{id}/pixQrCode", get(pix_qr))
            .with_state(Arc::clone(&shared));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = AsaasClient::new(&AsaasConfig {
            api_base: format!("http://{addr}/"),
            api_key: SecretString::from("aact_test_key"),
            webhook_token: None,
        })
        .unwrap();
        (client, shared)
    }

    fn fake(status: &str) -> Fake {
        Fake {
            payment_status: status.to_string(),
            ..Fake::default()
        }
    }

    #[tokio::test]
    async fn test_reuses_existing_customer() {
        let (client, shared) = spawn(Fake {
            existing_customer: true,
            ..fake("CONFIRMED")
        })
        .await;

        let id = client.find_or_create_customer(&payer()).await.unwrap();
        assert_eq!(id, "cus_existing");
        assert!(shared.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_creates_missing_customer() {
        let (client, shared) = spawn(fake("CONFIRMED")).await;

        let id = client.find_or_create_customer(&payer()).await.unwrap();
        assert_eq!(id, "cus_new");
        let posted = shared.posted.lock().unwrap();
        assert_eq!(posted[0].1["cpfCnpj"], "52998224725");
        assert_eq!(posted[0].1["mobilePhone"], "11987654321");
    }

    #[tokio::test]
    async fn test_card_charge_approved() {
        let (client, _) = spawn(fake("CONFIRMED")).await;
        let charge = client.charge_card(&card_request(1)).await.unwrap();
        assert_eq!(charge.gateway_payment_id, "pay_123");
        assert!(charge.status.is_paid());
    }

    #[tokio::test]
    async fn test_card_charge_under_review_is_accepted() {
        let (client, _) = spawn(fake("AWAITING_RISK_ANALYSIS")).await;
        let charge = client.charge_card(&card_request(2)).await.unwrap();
        assert_eq!(charge.status.as_str(), "AWAITING_RISK_ANALYSIS");
    }

    #[tokio::test]
    async fn test_card_charge_pending_is_declined() {
        let (client, _) = spawn(fake("PENDING")).await;
        let err = client.charge_card(&card_request(1)).await.unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
        assert_eq!(err.customer_message(), "Payment was not approved.");
    }

    #[tokio::test]
    async fn test_card_charge_surfaces_gateway_description() {
        let (client, _) = spawn(Fake {
            reject_with: Some("Transação não autorizada.".to_string()),
            ..fake("CONFIRMED")
        })
        .await;
        let err = client.charge_card(&card_request(1)).await.unwrap_err();
        assert_eq!(err.customer_message(), "Transação não autorizada.");
    }

    #[tokio::test]
    async fn test_card_charge_without_card_makes_no_calls() {
        let (client, shared) = spawn(fake("CONFIRMED")).await;
        let mut request = card_request(1);
        request.card = None;

        let err = client.charge_card(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingCard));
        assert!(shared.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pix_charge_returns_qr_code() {
        let (client, _) = spawn(fake("PENDING")).await;
        let pix = client
            .create_pix(&PixChargeRequest {
                amount: Cents::new(14_990),
                external_reference: "lp-1".to_string(),
                payer: payer(),
            })
            .await
            .unwrap();

        assert_eq!(pix.gateway_payment_id, "pay_123");
        assert_eq!(pix.status.as_str(), "PENDING");
        assert_eq!(pix.qr_code, "iVBOR-pay_123");
        assert_eq!(pix.copy_paste, "00020126pix");
    }

    #[tokio::test]
    async fn test_status_by_reference() {
        let (client, _) = spawn(fake("PENDING")).await;

        let lookup = client.status_by_reference("lp-paid").await.unwrap();
        assert!(lookup.paid());
        assert_eq!(lookup.gateway_payment_id.as_deref(), Some("pay_9"));

        let lookup = client.status_by_reference("lp-unknown").await.unwrap();
        assert!(!lookup.paid());
        assert!(lookup.gateway_payment_id.is_none());
    }

    #[tokio::test]
    async fn test_status_by_id() {
        let (client, _) = spawn(fake("PENDING")).await;
        assert!(client.status_by_id("pay_9").await.unwrap().paid());
        assert_eq!(
            client.status_by_id("pay_missing").await.unwrap(),
            PaymentLookup::default()
        );
    }
}
