//! Customer-facing order status.
//!
//! Resolves an order by id or external reference, or by codes found in a
//! free-text message (`#04827316`, `pedido número 04827316`), and renders a
//! summary with a Portuguese status label.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::instrument;

use dermosul_core::{OrderStatus, PaymentMethod, PaymentStatus};

use super::store::OrderStore;
use crate::db::RepositoryError;
use crate::models::OrderDetails;

/// Shown in place of the item list when an order has no items.
pub const NO_ITEMS: &str = "Itens não encontrados";

/// Minimum code length for prefix search.
const MIN_PREFIX_LEN: usize = 4;
const PREFIX_LIMIT: i64 = 5;

static HASH_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#([a-z0-9\-]+)").expect("Invalid regex"));

static PEDIDO_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)pedido(?:\s+n(?:ú|u)mero|\s+nº|\s+num|\s+numero|\s+n)?\s*#?([a-z0-9\-]+)")
        .expect("Invalid regex")
});

static ORDER_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpedido(s)?\b").expect("Invalid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub paid_cents: i64,
    pub external_reference: Option<String>,
    pub gateway_payment_id: Option<String>,
    /// Gateway status, or the payment status when the gateway never answered.
    pub gateway_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub name: String,
    pub qty: i32,
}

/// Status of one order as shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusView {
    pub order_id: String,
    /// Last six characters of the id.
    pub number: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub total_cents: i64,
    pub total_formatted: String,
    pub payment: PaymentSummary,
    pub destination: String,
    pub items: Vec<ItemSummary>,
}

impl From<&OrderDetails> for OrderStatusView {
    fn from(details: &OrderDetails) -> Self {
        let order = &details.order;
        let (method, status, paid) = details
            .payment
            .as_ref()
            .map_or((PaymentMethod::Desconhecido, PaymentStatus::Pendente, 0), |p| {
                (p.method, p.status, p.paid.as_i64())
            });

        let items: Vec<ItemSummary> = details
            .items
            .iter()
            .map(|item| ItemSummary {
                name: item.name.clone(),
                qty: item.qty,
            })
            .collect();

        Self {
            order_id: order.id.to_string(),
            number: order.id.number().to_string(),
            status: order.status,
            status_label: order.status.label(),
            total_cents: order.total.as_i64(),
            total_formatted: order.total.format_brl(),
            payment: PaymentSummary {
                method,
                status,
                paid_cents: paid,
                external_reference: order.external_reference.clone(),
                gateway_payment_id: order.gateway_payment_id.clone(),
                gateway_status: order
                    .gateway_status
                    .clone()
                    .unwrap_or_else(|| status.as_str().to_string()),
            },
            destination: details
                .shipping
                .as_ref()
                .map(crate::models::Address::destination)
                .unwrap_or_default(),
            items: if items.is_empty() {
                vec![ItemSummary {
                    name: NO_ITEMS.to_string(),
                    qty: 0,
                }]
            } else {
                items
            },
        }
    }
}

/// Outcome of resolving a free-text message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLookup {
    pub orders: Vec<OrderStatusView>,
    /// The message mentions an order but carries no code.
    pub needs_identifier: bool,
    pub requested_codes: Vec<String>,
}

/// Candidate order codes in a message, deduplicated, `#code` tokens first.
#[must_use]
pub fn extract_codes(message: &str) -> Vec<String> {
    let message = message.trim();
    let mut codes: Vec<String> = Vec::new();

    let captures = HASH_CODE
        .captures_iter(message)
        .chain(PEDIDO_CODE.captures_iter(message));
    for caps in captures {
        if let Some(code) = caps.get(1).map(|m| m.as_str().trim())
            && !code.is_empty()
            && !codes.iter().any(|c| c == code)
        {
            codes.push(code.to_string());
        }
    }
    codes
}

/// Resolve one order by id or external reference.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a lookup fails.
#[instrument(skip(store))]
pub async fn resolve(
    store: &dyn OrderStore,
    code: &str,
) -> Result<Option<OrderStatusView>, RepositoryError> {
    let found = store.find_by_code(code.trim()).await?;
    if found.is_none() {
        tracing::debug!("No order for code");
    }
    Ok(found.as_ref().map(OrderStatusView::from))
}

/// Resolve the orders a customer message refers to.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a lookup fails.
#[instrument(skip_all)]
pub async fn resolve_message(
    store: &dyn OrderStore,
    message: &str,
) -> Result<OrderLookup, RepositoryError> {
    let codes = extract_codes(message);

    if codes.is_empty() {
        return Ok(OrderLookup {
            needs_identifier: ORDER_KEYWORD.is_match(message),
            ..OrderLookup::default()
        });
    }

    let mut orders: Vec<OrderDetails> = Vec::new();
    for code in &codes {
        if let Some(details) = store.find_by_code(code).await?
            && !orders.iter().any(|o| o.order.id == details.order.id)
        {
            orders.push(details);
        }
    }

    if orders.is_empty() {
        for code in codes.iter().filter(|c| c.chars().count() >= MIN_PREFIX_LEN) {
            for details in store.search_prefix(code, PREFIX_LIMIT).await? {
                if !orders.iter().any(|o| o.order.id == details.order.id) {
                    orders.push(details);
                }
            }
        }
        orders.truncate(usize::try_from(PREFIX_LIMIT).unwrap_or(usize::MAX));
    }

    tracing::debug!(codes = ?codes, found = orders.len(), "Resolved order codes");

    Ok(OrderLookup {
        orders: orders.iter().map(OrderStatusView::from).collect(),
        needs_identifier: false,
        requested_codes: codes,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dermosul_core::OrderId;

    use super::*;
    use crate::models::order::tests::sample_details;
    use crate::services::store::tests::MemoryStore;

    #[test]
    fn test_extract_codes() {
        assert_eq!(extract_codes("Cadê o #04827316?"), ["04827316"]);
        assert_eq!(extract_codes("pedido número 123456"), ["123456"]);
        assert_eq!(extract_codes("Pedido nº #AB-12"), ["AB-12"]);
        assert_eq!(
            extract_codes("#abc12 e pedido num xyz99 e #abc12"),
            ["abc12", "xyz99"]
        );
        assert!(extract_codes("quero comprar um sérum").is_empty());
    }

    #[test]
    fn test_status_view() {
        let view = OrderStatusView::from(&sample_details());
        assert_eq!(view.order_id, "04827316");
        assert_eq!(view.number, "827316");
        assert_eq!(view.status_label, "Pago");
        assert_eq!(view.total_cents, 29_980);
        assert_eq!(view.total_formatted, "R$ 299,80");
        assert_eq!(view.payment.gateway_status, "CONFIRMED");
        assert_eq!(view.destination, "Barra Funda, São Paulo, SP");
        assert_eq!(view.items[0].qty, 2);
    }

    #[test]
    fn test_status_view_fallbacks() {
        let mut details = sample_details();
        details.items.clear();
        details.order.gateway_status = None;
        details.shipping = None;
        let view = OrderStatusView::from(&details);
        assert_eq!(view.items, [ItemSummary { name: NO_ITEMS.to_string(), qty: 0 }]);
        assert_eq!(view.payment.gateway_status, "confirmado");
        assert_eq!(view.destination, "");
    }

    #[test]
    fn test_status_view_serializes_camel_case() {
        let json = serde_json::to_value(OrderStatusView::from(&sample_details())).unwrap();
        assert_eq!(json["statusLabel"], "Pago");
        assert_eq!(json["status"], "pago");
        assert_eq!(json["payment"]["paidCents"], 29_980);
    }

    #[tokio::test]
    async fn test_resolve_by_reference_case_variants() {
        let store = MemoryStore::with([sample_details()]);
        let view = resolve(&store, "LP-SERUM-1710429000").await.unwrap().unwrap();
        assert_eq!(view.order_id, "04827316");
        assert!(resolve(&store, "99999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_message_without_code() {
        let store = MemoryStore::default();
        let lookup = resolve_message(&store, "Onde está meu pedido?").await.unwrap();
        assert!(lookup.needs_identifier);
        assert!(lookup.orders.is_empty());

        let lookup = resolve_message(&store, "Bom dia").await.unwrap();
        assert!(!lookup.needs_identifier);
        assert!(lookup.requested_codes.is_empty());
    }

    #[tokio::test]
    async fn test_message_exact_then_prefix() {
        let mut other = sample_details();
        other.order.id = OrderId::new("04829999");
        other.order.external_reference = None;
        let store = MemoryStore::with([sample_details(), other]);

        let lookup = resolve_message(&store, "status do #04827316").await.unwrap();
        assert_eq!(lookup.orders.len(), 1);
        assert_eq!(lookup.requested_codes, ["04827316"]);

        let lookup = resolve_message(&store, "pedido 0482").await.unwrap();
        assert_eq!(lookup.orders.len(), 2);

        let lookup = resolve_message(&store, "pedido 048").await.unwrap();
        assert!(lookup.orders.is_empty());
        assert!(!lookup.needs_identifier);
        assert_eq!(lookup.requested_codes, ["048"]);
    }
}
