//! Order aggregate and its dashboard wire format.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dermosul_core::{
    Cents, CustomerId, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentMethod, PaymentStatus,
};

use super::customer::{Address, Customer};

/// An order row.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub external_reference: Option<String>,
    pub status: OrderStatus,
    pub category: String,
    pub total: Cents,
    pub tracking_code: Option<String>,
    pub lp_status: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A line item.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub sku: String,
    pub name: String,
    pub qty: i32,
    pub unit_price: Cents,
}

impl OrderItem {
    #[must_use]
    pub fn subtotal(&self) -> Cents {
        self.unit_price * i64::from(self.qty)
    }
}

/// A payment attempt recorded against an order.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub paid: Cents,
    pub installments: i32,
    pub created_at: DateTime<Utc>,
}

/// An order with everything needed to render or notify about it.
///
/// `payment` is the latest payment row and `shipping` the customer's most
/// recent address.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: Order,
    pub customer: Option<Customer>,
    pub shipping: Option<Address>,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}

impl OrderDetails {
    #[must_use]
    pub fn client_name(&self) -> String {
        self.customer
            .as_ref()
            .map_or_else(|| "Cliente".to_string(), Customer::display_name)
    }

    #[must_use]
    pub fn payment_method(&self) -> PaymentMethod {
        self.payment.as_ref().map(|p| p.method).unwrap_or_default()
    }

    #[must_use]
    pub fn items_total(&self) -> Cents {
        self.items.iter().map(OrderItem::subtotal).sum()
    }

    /// Name of the first item, used in notification subjects.
    #[must_use]
    pub fn headline_item(&self) -> String {
        self.items
            .first()
            .map_or_else(|| "Produto".to_string(), |item| item.name.clone())
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// Dashboard representation of an order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    /// First 8 characters of the id
    pub id: String,
    pub full_id: String,
    /// `YYYY-MM-DD`
    pub created_at: String,
    pub client: String,
    pub category: String,
    pub status: OrderStatus,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub payment: PaymentView,
    pub customer: CustomerView,
    pub shipping: ShippingView,
    pub items: Vec<ItemView>,
    pub totals: TotalsView,
    pub external_reference: Option<String>,
    pub tracking_code: Option<String>,
    pub lp_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub installments: i32,
    pub paid_amount: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub id: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    pub cpf: String,
    pub birthdate: String,
    pub email: String,
    pub phone: String,
    pub gender: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShippingView {
    #[serde(rename = "postalCode")]
    pub postal_code: String,
    pub address1: String,
    pub address2: String,
    pub address2_complement: String,
    pub district: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub sku: String,
    pub name: String,
    pub qty: i32,
    pub price: f64,
    pub subtotal: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    pub items_total: f64,
    pub sub_total: f64,
    pub shipping: f64,
    pub discount: f64,
    pub grand_total: f64,
    pub total: f64,
}

impl From<&OrderDetails> for OrderView {
    fn from(details: &OrderDetails) -> Self {
        let order = &details.order;
        let payment = details.payment.as_ref().map_or(
            PaymentView {
                method: PaymentMethod::Desconhecido,
                status: PaymentStatus::Pendente,
                installments: 1,
                paid_amount: 0.0,
            },
            |p| PaymentView {
                method: p.method,
                status: p.status,
                installments: p.installments.max(1),
                paid_amount: p.paid.to_reais_f64(),
            },
        );

        let customer = details
            .customer
            .as_ref()
            .map(|c| CustomerView {
                id: Some(c.id.as_i32()),
                first_name: c.first_name.clone(),
                last_name: c.last_name.clone(),
                cpf: c.cpf.clone().unwrap_or_default(),
                birthdate: c.birth_date.clone().unwrap_or_default(),
                email: c.email.to_string(),
                phone: c.phone.clone(),
                gender: c.gender.map(|g| g.as_str().to_string()).unwrap_or_default(),
            })
            .unwrap_or_default();

        let shipping = details
            .shipping
            .as_ref()
            .map(|a| ShippingView {
                postal_code: a.cep.clone(),
                address1: a.street.clone(),
                address2: a.number.clone(),
                address2_complement: a.complement.clone(),
                district: a.district.clone(),
                city: a.city.clone(),
                state: a.state.clone(),
            })
            .unwrap_or_default();

        let items = details
            .items
            .iter()
            .map(|item| ItemView {
                sku: item.sku.clone(),
                name: item.name.clone(),
                qty: item.qty,
                price: item.unit_price.to_reais_f64(),
                subtotal: item.subtotal().to_reais_f64(),
            })
            .collect();

        let items_total = details.items_total().to_reais_f64();
        let total = order.total.to_reais_f64();

        Self {
            id: order.id.short().to_string(),
            full_id: order.id.to_string(),
            created_at: order.created_at.format("%Y-%m-%d").to_string(),
            client: details.client_name(),
            category: order.category.clone(),
            status: order.status,
            total,
            payment_method: payment.method,
            payment,
            customer,
            shipping,
            items,
            totals: TotalsView {
                items_total,
                sub_total: items_total,
                shipping: 0.0,
                discount: 0.0,
                grand_total: total,
                total,
            },
            external_reference: order.external_reference.clone(),
            tracking_code: order.tracking_code.clone(),
            lp_status: order.lp_status.clone(),
        }
    }
}
