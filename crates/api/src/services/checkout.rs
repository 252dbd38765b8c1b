//! Order/payment status reconciliation.
//!
//! Charges an order through the [`PaymentProvider`], applies status
//! transitions with their payment side effects, reacts to gateway webhooks
//! and polling, and sends the matching lifecycle e-mail. E-mail is best
//! effort: failures are logged and never returned.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use dermosul_core::{OrderId, OrderStatus, PaymentMethod, PaymentStatus};

use super::email::{Notification, Notifier, OrderEmail, SendOutcome};
use super::payments::{
    CardChargeRequest, CardDetails, GatewayStatus, PayerInfo, PaymentError, PaymentLookup,
    PaymentProvider, PixChargeRequest,
};
use super::store::OrderStore;
use crate::config::TestCardConfig;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::OrderDetails;

const PNG_DATA_URI: &str = "data:image/png;base64,";

/// PIX data handed back to the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixView {
    /// QR code image as a `data:` URI.
    pub qr_code: String,
    pub copy_paste: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeSummary {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub external_reference: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix: Option<PixView>,
}

/// Result of charging an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOutcome {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub payment: ChargeSummary,
}

/// Result of polling the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub success: bool,
    pub paid: bool,
    pub status: Option<String>,
}

/// Asaas webhook body. Only the fields acted on are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    pub payment: Option<WebhookPayment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayment {
    pub id: Option<String>,
    pub status: Option<String>,
    pub external_reference: Option<String>,
}

impl WebhookEvent {
    /// Events that mean the charge was paid.
    #[must_use]
    pub fn confirms_payment(&self) -> bool {
        matches!(self.event.as_str(), "PAYMENT_CONFIRMED" | "PAYMENT_RECEIVED")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Paid(OrderId),
    UnknownReference,
    Ignored,
}

/// Reference used when an order reaches the gateway without one.
#[must_use]
pub fn default_reference(id: &OrderId) -> String {
    format!("pedido-{id}")
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// PNG payloads without a `data:` prefix get one.
#[must_use]
pub fn qr_data_uri(encoded: &str) -> String {
    if encoded.starts_with("data:image") {
        encoded.to_string()
    } else {
        format!("{PNG_DATA_URI}{encoded}")
    }
}

impl TestCardConfig {
    /// Whether a card or buyer CPF marks the purchase as a test.
    #[must_use]
    pub fn matches(&self, card: Option<&CardDetails>, cpf: Option<&str>) -> bool {
        let card_matches = card.is_some_and(|card| {
            card.digits() == digits(&self.number)
                && self
                    .cvv
                    .as_deref()
                    .is_none_or(|cvv| digits(cvv) == digits(&card.cvv))
        });
        let cpf_matches = match (self.cpf.as_deref(), cpf) {
            (Some(test), Some(cpf)) => !digits(test).is_empty() && digits(test) == digits(cpf),
            _ => false,
        };
        card_matches || cpf_matches
    }
}

/// Checkout and status reconciliation over an [`OrderStore`].
pub struct CheckoutService<'a> {
    store: &'a dyn OrderStore,
    payments: &'a dyn PaymentProvider,
    notifier: &'a dyn Notifier,
    test_card: &'a TestCardConfig,
    tracking_base: Option<&'a str>,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a dyn OrderStore,
        payments: &'a dyn PaymentProvider,
        notifier: &'a dyn Notifier,
        test_card: &'a TestCardConfig,
        tracking_base: Option<&'a str>,
    ) -> Self {
        Self {
            store,
            payments,
            notifier,
            test_card,
            tracking_base,
        }
    }

    async fn load(&self, id: &OrderId) -> Result<OrderDetails> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pedido {id} não encontrado.")))
    }

    /// Set an order's status. `pago` confirms every payment (recording the
    /// total as paid) and `cancelado` cancels them. A status change sends
    /// the matching e-mail.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the order does not exist, or
    /// `AppError::Database` if an update fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn apply_status(&self, id: &OrderId, status: OrderStatus) -> Result<OrderDetails> {
        let previous = self.load(id).await?.order.status;

        self.store.set_status(id, status).await?;
        match status {
            OrderStatus::Pago => {
                self.store
                    .set_payments_status(id, PaymentStatus::Confirmado)
                    .await?;
            }
            OrderStatus::Cancelado => {
                self.store
                    .set_payments_status(id, PaymentStatus::Cancelado)
                    .await?;
            }
            _ => {}
        }

        let details = self.load(id).await?;
        if previous != status {
            tracing::info!(from = %previous, to = %status, "Order status changed");
            add_breadcrumb(
                "order",
                "Status changed",
                &[("order_id", id.as_str()), ("status", status.as_str())],
            );
            self.notify_status(&details).await;
        }
        Ok(details)
    }

    async fn notify_status(&self, details: &OrderDetails) {
        let kind = match details.order.status {
            OrderStatus::Pago => Notification::PaymentApproved,
            OrderStatus::Pendente => Notification::Pending,
            OrderStatus::Enviado => Notification::Shipped,
            OrderStatus::AguardandoPagamento | OrderStatus::Cancelado => return,
        };

        let Some(email) = OrderEmail::from_details(details, self.tracking_base) else {
            tracing::debug!(order_id = %details.order.id, "Order has no customer, no e-mail");
            return;
        };

        match self.notifier.notify(kind, &email).await {
            Ok(SendOutcome::Sent) => {}
            Ok(SendOutcome::Skipped) => {
                tracing::debug!(order_id = %email.order_id, ?kind, "Notification skipped");
            }
            Err(e) => {
                tracing::warn!(order_id = %email.order_id, ?kind, error = %e, "Failed to send notification");
            }
        }
    }

    /// Cancel an order and its payments after a failed charge.
    async fn cancel(&self, id: &OrderId) -> Result<()> {
        self.store.set_status(id, OrderStatus::Cancelado).await?;
        self.store
            .set_payments_status(id, PaymentStatus::Cancelado)
            .await?;
        Ok(())
    }

    async fn fail(&self, id: &OrderId, error: PaymentError) -> AppError {
        tracing::warn!(order_id = %id, error = %error, "Charge failed, cancelling order");
        if let Err(cancel_err) = self.cancel(id).await {
            return cancel_err;
        }
        AppError::Gateway(error)
    }

    /// Charge an order with its recorded payment method.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Gateway` when the gateway refuses the charge (the
    /// order and its payments are cancelled first), `AppError::BadRequest`
    /// for orders without a customer or with a method that cannot be
    /// charged, and `AppError::Database` if persisting the result fails.
    #[instrument(skip(self, details, card), fields(order_id = %details.order.id))]
    pub async fn charge(
        &self,
        details: &OrderDetails,
        card: Option<&CardDetails>,
    ) -> Result<ChargeOutcome> {
        let id = &details.order.id;
        let customer = details
            .customer
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("Pedido sem cliente.".to_string()))?;

        let reference = self
            .store
            .ensure_reference(id, &default_reference(id))
            .await?;

        let payer = PayerInfo {
            name: customer.display_name(),
            email: customer.email.to_string(),
            cpf: customer.cpf.clone().unwrap_or_default(),
            phone: customer.phone.clone(),
            postal_code: details.shipping.as_ref().map(|a| digits(&a.cep)),
            address_number: details.shipping.as_ref().map(|a| a.number.clone()),
        };
        let installments = details
            .payment
            .as_ref()
            .and_then(|p| u32::try_from(p.installments).ok())
            .unwrap_or(1)
            .max(1);

        let method = details.payment_method();
        let mut pix = None;
        let (gateway_payment_id, status) = match method {
            PaymentMethod::Pix => {
                let request = PixChargeRequest {
                    amount: details.order.total,
                    external_reference: reference.clone(),
                    payer,
                };
                match self.payments.create_pix(&request).await {
                    Ok(charge) => {
                        pix = Some(PixView {
                            qr_code: qr_data_uri(&charge.qr_code),
                            copy_paste: charge.copy_paste,
                        });
                        (charge.gateway_payment_id, charge.status)
                    }
                    Err(e) => return Err(self.fail(id, e).await),
                }
            }
            PaymentMethod::Cartao if self.test_card.matches(card, Some(&payer.cpf)) => {
                tracing::info!(order_id = %id, "Test purchase, gateway bypassed");
                (
                    format!("test-{reference}-{}", Utc::now().timestamp_millis()),
                    GatewayStatus::new(GatewayStatus::TEST_APPROVED),
                )
            }
            PaymentMethod::Cartao => {
                let request = CardChargeRequest {
                    amount: details.order.total,
                    external_reference: reference.clone(),
                    installments,
                    payer,
                    card: card.cloned(),
                };
                match self.payments.charge_card(&request).await {
                    Ok(charge) => (charge.gateway_payment_id, charge.status),
                    Err(e) => return Err(self.fail(id, e).await),
                }
            }
            PaymentMethod::Boleto | PaymentMethod::Desconhecido => {
                return Err(AppError::BadRequest(format!(
                    "Forma de pagamento não suportada: {method}"
                )));
            }
        };

        let payment_status = status.payment_status();
        self.store
            .record_charge(id, Some(&gateway_payment_id), status.as_str(), payment_status)
            .await?;

        let order_status = if status.is_paid() {
            self.apply_status(id, OrderStatus::Pago).await?.order.status
        } else {
            details.order.status
        };

        Ok(ChargeOutcome {
            order_id: id.to_string(),
            order_number: id.number().to_string(),
            status: order_status,
            total_cents: details.order.total.as_i64(),
            payment: ChargeSummary {
                method,
                status: payment_status,
                external_reference: reference,
                gateway_payment_id: Some(gateway_payment_id),
                gateway_status: status.to_string(),
                pix,
            },
        })
    }

    /// Mark the order with this external reference as paid, storing the
    /// polled gateway payment when given. Unknown references are logged and
    /// yield `None`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if a lookup or update fails.
    #[instrument(skip(self, lookup))]
    pub async fn mark_paid_by_reference(
        &self,
        reference: &str,
        lookup: Option<&PaymentLookup>,
    ) -> Result<Option<OrderDetails>> {
        let Some(details) = self.store.find_by_reference(reference).await? else {
            tracing::warn!(reference, "No order for external reference");
            return Ok(None);
        };
        if let Some(lookup) = lookup
            && let Some(status) = &lookup.status
        {
            self.store
                .record_charge(
                    &details.order.id,
                    lookup.gateway_payment_id.as_deref(),
                    status.as_str(),
                    status.payment_status(),
                )
                .await?;
        }
        self.apply_status(&details.order.id, OrderStatus::Pago)
            .await
            .map(Some)
    }

    /// Poll the gateway (by payment id when given) and mark the order paid
    /// when the charge is.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Gateway` if the gateway call fails, or
    /// `AppError::Database` if updating the order fails.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        reference: &str,
        payment_id: Option<&str>,
    ) -> Result<Reconciliation> {
        let lookup = match payment_id.filter(|p| !p.is_empty()) {
            Some(payment_id) => self.payments.status_by_id(payment_id).await?,
            None => self.payments.status_by_reference(reference).await?,
        };

        let paid = lookup.paid();
        if paid {
            self.mark_paid_by_reference(reference, Some(&lookup)).await?;
        }

        Ok(Reconciliation {
            success: true,
            paid,
            status: lookup.status.map(|s| s.to_string()),
        })
    }

    /// Apply a gateway webhook.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if updating the order fails.
    #[instrument(skip_all, fields(event = %event.event))]
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let payment = event.payment.as_ref();
        let reference = payment
            .and_then(|p| p.external_reference.as_deref())
            .filter(|r| !r.is_empty());

        let (true, Some(reference)) = (event.confirms_payment(), reference) else {
            tracing::debug!("Webhook ignored");
            return Ok(WebhookOutcome::Ignored);
        };

        tracing::info!(reference, "Payment confirmed by webhook");
        let Some(details) = self.store.find_by_reference(reference).await? else {
            tracing::warn!(reference, "No order for external reference");
            return Ok(WebhookOutcome::UnknownReference);
        };

        if let Some(status) = payment.and_then(|p| p.status.as_deref()) {
            let status = GatewayStatus::new(status);
            self.store
                .record_charge(
                    &details.order.id,
                    payment.and_then(|p| p.id.as_deref()),
                    status.as_str(),
                    status.payment_status(),
                )
                .await?;
        }

        let details = self
            .apply_status(&details.order.id, OrderStatus::Pago)
            .await?;
        Ok(WebhookOutcome::Paid(details.order.id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dermosul_core::Cents;
    use serde_json::json;

    use super::*;
    use crate::models::order::tests::sample_details;
    use crate::services::email::tests::RecordingNotifier;
    use crate::services::email::{EmailError, SendOutcome};
    use crate::services::payments::{Charge, PaymentLookup, PixCharge};
    use crate::services::store::tests::MemoryStore;

    /// Gateway double driven by fixed statuses.
    #[derive(Default)]
    struct FakeGateway {
        /// `None` declines every card.
        card_status: Option<&'static str>,
        pix_fails: bool,
        lookup_status: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn approving(status: &'static str) -> Self {
            Self {
                card_status: Some(status),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl PaymentProvider for FakeGateway {
        async fn find_or_create_customer(
            &self,
            _payer: &PayerInfo,
        ) -> std::result::Result<String, PaymentError> {
            Ok("cus_000001".to_string())
        }

        async fn charge_card(
            &self,
            request: &CardChargeRequest,
        ) -> std::result::Result<Charge, PaymentError> {
            self.log(format!("card:{}:{}", request.external_reference, request.installments));
            if request.card.is_none() {
                return Err(PaymentError::MissingCard);
            }
            match self.card_status {
                Some(status) => Ok(Charge {
                    gateway_payment_id: "pay_card_1".to_string(),
                    status: GatewayStatus::new(status),
                }),
                None => Err(PaymentError::Declined(
                    crate::services::payments::NOT_APPROVED.to_string(),
                )),
            }
        }

        async fn create_pix(
            &self,
            request: &PixChargeRequest,
        ) -> std::result::Result<PixCharge, PaymentError> {
            self.log(format!("pix:{}", request.external_reference));
            if self.pix_fails {
                return Err(PaymentError::Api {
                    status: 400,
                    message: "Cliente inválido".to_string(),
                });
            }
            Ok(PixCharge {
                gateway_payment_id: "pay_pix_1".to_string(),
                status: GatewayStatus::new(GatewayStatus::PENDING),
                qr_code: "iVBORw0KGgo=".to_string(),
                copy_paste: "00020126580014br.gov.bcb.pix".to_string(),
            })
        }

        async fn status_by_reference(
            &self,
            reference: &str,
        ) -> std::result::Result<PaymentLookup, PaymentError> {
            self.log(format!("by-ref:{reference}"));
            Ok(PaymentLookup {
                gateway_payment_id: Some("pay_card_1".to_string()),
                status: self.lookup_status.map(GatewayStatus::new),
            })
        }

        async fn status_by_id(
            &self,
            payment_id: &str,
        ) -> std::result::Result<PaymentLookup, PaymentError> {
            self.log(format!("by-id:{payment_id}"));
            Ok(PaymentLookup {
                gateway_payment_id: Some(payment_id.to_string()),
                status: self.lookup_status.map(GatewayStatus::new),
            })
        }
    }

    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn notify(
            &self,
            _kind: Notification,
            _email: &OrderEmail,
        ) -> std::result::Result<SendOutcome, EmailError> {
            Err(EmailError::InvalidAddress("nobody".to_string()))
        }
    }

    /// The sample order before any payment happened.
    fn pending_order(method: PaymentMethod) -> OrderDetails {
        let mut details = sample_details();
        details.order.status = OrderStatus::Pendente;
        details.order.external_reference = None;
        details.order.gateway_payment_id = None;
        details.order.gateway_status = None;
        let payment = details.payment.as_mut().unwrap();
        payment.method = method;
        payment.status = PaymentStatus::Pendente;
        payment.paid = Cents::ZERO;
        details
    }

    fn card() -> CardDetails {
        serde_json::from_value(json!({
            "holderName": "ANA SOUZA",
            "number": "5162 3060 0000 0008",
            "expiryMonth": "05",
            "expiryYear": "2030",
            "ccv": "318"
        }))
        .unwrap()
    }

    fn test_card() -> TestCardConfig {
        TestCardConfig::default()
    }

    fn service<'a>(
        store: &'a MemoryStore,
        gateway: &'a FakeGateway,
        notifier: &'a dyn Notifier,
        test_card: &'a TestCardConfig,
    ) -> CheckoutService<'a> {
        CheckoutService::new(
            store,
            gateway,
            notifier,
            test_card,
            Some("https://dermosul.com.br/pedido"),
        )
    }

    #[test]
    fn test_qr_data_uri() {
        assert_eq!(qr_data_uri("iVBOR"), "data:image/png;base64,iVBOR");
        assert_eq!(
            qr_data_uri("data:image/png;base64,iVBOR"),
            "data:image/png;base64,iVBOR"
        );
    }

    #[test]
    fn test_card_matching() {
        let config = TestCardConfig {
            number: "4111111111111111".to_string(),
            cvv: Some("123".to_string()),
            cpf: Some("529.982.247-25".to_string()),
        };
        let mut test = card();
        test.number = "4111 1111 1111 1111".to_string();
        test.cvv = "123".to_string();
        assert!(config.matches(Some(&test), None));

        test.cvv = "999".to_string();
        assert!(!config.matches(Some(&test), None));
        assert!(config.matches(None, Some("52998224725")));
        assert!(!config.matches(Some(&card()), Some("11144477735")));
        assert!(!TestCardConfig::default().matches(None, Some("52998224725")));
    }

    #[tokio::test]
    async fn test_card_charge_approved() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::approving("CONFIRMED");
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let details = store.snapshot("04827316");
        let outcome = svc.charge(&details, Some(&card())).await.unwrap();

        assert_eq!(outcome.status, OrderStatus::Pago);
        assert_eq!(outcome.payment.status, PaymentStatus::Confirmado);
        assert_eq!(outcome.payment.external_reference, "pedido-04827316");
        assert_eq!(outcome.payment.gateway_status, "CONFIRMED");
        assert!(outcome.payment.pix.is_none());
        assert_eq!(gateway.calls(), ["card:pedido-04827316:3"]);

        let stored = store.snapshot("04827316");
        assert_eq!(stored.order.status, OrderStatus::Pago);
        assert_eq!(stored.order.gateway_payment_id.as_deref(), Some("pay_card_1"));
        let payment = stored.payment.unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmado);
        assert_eq!(payment.paid, Cents::new(29_980));
        assert_eq!(notifier.kinds(), [Notification::PaymentApproved]);
    }

    #[tokio::test]
    async fn test_card_in_risk_analysis_stays_pending() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::approving("AWAITING_RISK_ANALYSIS");
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let outcome = svc
            .charge(&store.snapshot("04827316"), Some(&card()))
            .await
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Pendente);
        assert_eq!(outcome.payment.status, PaymentStatus::Analise);
        assert!(notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_card_declined_cancels_order() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let err = svc
            .charge(&store.snapshot("04827316"), Some(&card()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Gateway(PaymentError::Declined(_))));

        let stored = store.snapshot("04827316");
        assert_eq!(stored.order.status, OrderStatus::Cancelado);
        assert_eq!(stored.payment.unwrap().status, PaymentStatus::Cancelado);
        assert!(notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_missing_card_is_reported() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::approving("CONFIRMED");
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let err = svc.charge(&store.snapshot("04827316"), None).await.unwrap_err();
        assert!(matches!(err, AppError::Gateway(PaymentError::MissingCard)));
    }

    #[tokio::test]
    async fn test_test_card_bypasses_gateway() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let mut test = card();
        test.number = "4111111111111111".to_string();
        let outcome = svc
            .charge(&store.snapshot("04827316"), Some(&test))
            .await
            .unwrap();

        assert!(gateway.calls().is_empty());
        assert_eq!(outcome.status, OrderStatus::Pago);
        assert_eq!(outcome.payment.gateway_status, "TEST_APPROVED");
        assert!(
            outcome
                .payment
                .gateway_payment_id
                .unwrap()
                .starts_with("test-pedido-04827316-")
        );
    }

    #[tokio::test]
    async fn test_test_cpf_bypasses_gateway() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = TestCardConfig {
            cpf: Some("52998224725".to_string()),
            ..TestCardConfig::default()
        };
        let svc = service(&store, &gateway, &notifier, &tc);

        let outcome = svc
            .charge(&store.snapshot("04827316"), Some(&card()))
            .await
            .unwrap();
        assert!(gateway.calls().is_empty());
        assert_eq!(outcome.payment.status, PaymentStatus::Confirmado);
    }

    #[tokio::test]
    async fn test_pix_charge_returns_qr() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Pix)]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let outcome = svc.charge(&store.snapshot("04827316"), None).await.unwrap();

        assert_eq!(outcome.status, OrderStatus::Pendente);
        assert_eq!(outcome.payment.status, PaymentStatus::Pendente);
        assert_eq!(outcome.payment.gateway_status, "PENDING");
        let pix = outcome.payment.pix.unwrap();
        assert_eq!(pix.qr_code, "data:image/png;base64,iVBORw0KGgo=");
        assert!(pix.copy_paste.starts_with("000201"));

        let stored = store.snapshot("04827316");
        assert_eq!(stored.order.gateway_payment_id.as_deref(), Some("pay_pix_1"));
        assert_eq!(stored.order.gateway_status.as_deref(), Some("PENDING"));
    }

    #[tokio::test]
    async fn test_pix_failure_cancels_order() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Pix)]);
        let gateway = FakeGateway {
            pix_fails: true,
            ..FakeGateway::default()
        };
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let err = svc.charge(&store.snapshot("04827316"), None).await.unwrap_err();
        match err {
            AppError::Gateway(e) => assert_eq!(e.customer_message(), "Cliente inválido"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            store.snapshot("04827316").order.status,
            OrderStatus::Cancelado
        );
    }

    #[tokio::test]
    async fn test_boleto_is_rejected() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Boleto)]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let err = svc.charge(&store.snapshot("04827316"), None).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_existing_reference_is_kept() {
        let mut order = pending_order(PaymentMethod::Pix);
        order.order.external_reference = Some("lp-serum-42".to_string());
        let store = MemoryStore::with([order]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        svc.charge(&store.snapshot("04827316"), None).await.unwrap();
        assert_eq!(gateway.calls(), ["pix:lp-serum-42"]);
    }

    #[tokio::test]
    async fn test_apply_status_notifies_on_change_only() {
        let mut order = pending_order(PaymentMethod::Cartao);
        order.order.tracking_code = Some("BR123456789BR".to_string());
        let store = MemoryStore::with([order]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);
        let id = OrderId::new("04827316");

        svc.apply_status(&id, OrderStatus::Enviado).await.unwrap();
        svc.apply_status(&id, OrderStatus::Enviado).await.unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Notification::Shipped);
        assert_eq!(sent[0].1.tracking.as_deref(), Some("BR123456789BR"));
        assert_eq!(
            sent[0].1.link.as_deref(),
            Some("https://dermosul.com.br/pedido/04827316")
        );
    }

    #[tokio::test]
    async fn test_apply_status_side_effects() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);
        let id = OrderId::new("04827316");

        let details = svc.apply_status(&id, OrderStatus::Cancelado).await.unwrap();
        assert_eq!(details.payment.unwrap().status, PaymentStatus::Cancelado);

        let details = svc.apply_status(&id, OrderStatus::Pago).await.unwrap();
        let payment = details.payment.unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmado);
        assert_eq!(payment.paid, Cents::new(29_980));

        let details = svc
            .apply_status(&id, OrderStatus::AguardandoPagamento)
            .await
            .unwrap();
        assert_eq!(details.payment.unwrap().status, PaymentStatus::Confirmado);
        assert_eq!(notifier.kinds(), [Notification::PaymentApproved]);

        let err = svc
            .apply_status(&OrderId::new("00000000"), OrderStatus::Pago)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Cartao)]);
        let gateway = FakeGateway::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &BrokenNotifier, &tc);

        let details = svc
            .apply_status(&OrderId::new("04827316"), OrderStatus::Pago)
            .await
            .unwrap();
        assert_eq!(details.order.status, OrderStatus::Pago);
    }

    #[tokio::test]
    async fn test_webhook_confirms_payment() {
        let mut order = pending_order(PaymentMethod::Pix);
        order.order.external_reference = Some("lp-serum-42".to_string());
        let store = MemoryStore::with([order]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let event: WebhookEvent = serde_json::from_value(json!({
            "event": "PAYMENT_RECEIVED",
            "payment": {
                "id": "pay_pix_1",
                "status": "RECEIVED",
                "externalReference": "lp-serum-42"
            }
        }))
        .unwrap();

        let outcome = svc.handle_webhook(&event).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Paid(OrderId::new("04827316")));

        let stored = store.snapshot("04827316");
        assert_eq!(stored.order.status, OrderStatus::Pago);
        assert_eq!(stored.order.gateway_status.as_deref(), Some("RECEIVED"));
        assert_eq!(notifier.kinds(), [Notification::PaymentApproved]);
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_events() {
        let store = MemoryStore::with([pending_order(PaymentMethod::Pix)]);
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let overdue: WebhookEvent = serde_json::from_value(json!({
            "event": "PAYMENT_OVERDUE",
            "payment": { "externalReference": "pedido-04827316" }
        }))
        .unwrap();
        assert_eq!(
            svc.handle_webhook(&overdue).await.unwrap(),
            WebhookOutcome::Ignored
        );

        let no_reference: WebhookEvent =
            serde_json::from_value(json!({ "event": "PAYMENT_CONFIRMED", "payment": {} })).unwrap();
        assert_eq!(
            svc.handle_webhook(&no_reference).await.unwrap(),
            WebhookOutcome::Ignored
        );

        let unknown: WebhookEvent = serde_json::from_value(json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": { "externalReference": "nao-existe" }
        }))
        .unwrap();
        assert_eq!(
            svc.handle_webhook(&unknown).await.unwrap(),
            WebhookOutcome::UnknownReference
        );
        assert_eq!(
            store.snapshot("04827316").order.status,
            OrderStatus::Pendente
        );
    }

    #[tokio::test]
    async fn test_reconcile_by_reference_and_id() {
        let mut order = pending_order(PaymentMethod::Cartao);
        order.order.external_reference = Some("lp-serum-42".to_string());
        let store = MemoryStore::with([order]);
        let gateway = FakeGateway {
            lookup_status: Some("RECEIVED_IN_CASH"),
            ..FakeGateway::default()
        };
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let result = svc.reconcile("lp-serum-42", None).await.unwrap();
        assert!(result.paid);
        assert_eq!(result.status.as_deref(), Some("RECEIVED_IN_CASH"));
        let stored = store.snapshot("04827316");
        assert_eq!(stored.order.status, OrderStatus::Pago);
        assert_eq!(stored.order.gateway_payment_id.as_deref(), Some("pay_card_1"));
        assert_eq!(stored.order.gateway_status.as_deref(), Some("RECEIVED_IN_CASH"));
        assert_eq!(stored.payment.unwrap().status, PaymentStatus::Confirmado);

        svc.reconcile("lp-serum-42", Some("pay_card_1")).await.unwrap();
        assert_eq!(gateway.calls(), ["by-ref:lp-serum-42", "by-id:pay_card_1"]);
    }

    #[tokio::test]
    async fn test_reconcile_unpaid_or_unknown() {
        let store = MemoryStore::default();
        let gateway = FakeGateway::default();
        let notifier = RecordingNotifier::default();
        let tc = test_card();
        let svc = service(&store, &gateway, &notifier, &tc);

        let result = svc.reconcile("nao-existe", None).await.unwrap();
        assert!(result.success);
        assert!(!result.paid);
        assert!(result.status.is_none());

        assert!(svc.mark_paid_by_reference("nao-existe", None).await.unwrap().is_none());
    }
}
