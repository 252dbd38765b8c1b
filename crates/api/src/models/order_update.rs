//! Admin order edits.
//!
//! Blank strings mean "leave unchanged", matching how the dashboard form
//! submits untouched inputs.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use dermosul_core::{Cents, Cpf, Email, Gender, OrderStatus, PaymentMethod};

use super::FieldErrors;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    #[serde(alias = "birthdate")]
    pub birth_date: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingPatch {
    #[serde(rename = "postalCode")]
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub address2_complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// PATCH `/api/orders/:id` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    pub customer: Option<CustomerPatch>,
    pub shipping: Option<ShippingPatch>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub total: Option<Value>,
    pub created_at: Option<String>,
    pub payment_method: Option<String>,
    pub tracking_code: Option<String>,
}

/// Validated customer changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Email>,
    pub phone: Option<String>,
    pub cpf: Option<Cpf>,
    pub birth_date: Option<String>,
    pub gender: Option<Gender>,
}

impl CustomerUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Shipping address to match (by cep, street and number) or create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingUpdate {
    pub cep: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// Validated order changes.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub customer: CustomerUpdate,
    pub shipping: Option<ShippingUpdate>,
    pub status: Option<OrderStatus>,
    pub category: Option<String>,
    pub total: Option<Cents>,
    pub created_at: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    pub tracking_code: Option<String>,
}

fn filled(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

fn parse_money(value: &Value) -> Option<Cents> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    let reais = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    Cents::from_reais(reais)
}

impl CustomerPatch {
    fn resolve(&self, errors: &mut FieldErrors) -> CustomerUpdate {
        let email = filled(self.email.as_ref()).and_then(|raw| {
            Email::parse(&raw)
                .map_err(|_| {
                    errors.insert("customer.email".to_string(), "Email inválido.".to_string());
                })
                .ok()
        });
        let cpf = filled(self.cpf.as_ref()).and_then(|raw| {
            Cpf::parse(&raw)
                .map_err(|_| {
                    errors.insert("customer.cpf".to_string(), "CPF inválido.".to_string());
                })
                .ok()
        });
        let gender = filled(self.gender.as_ref()).and_then(|raw| {
            Gender::from_str(&raw)
                .map_err(|_| {
                    errors.insert(
                        "customer.gender".to_string(),
                        "Gênero inválido. Use 'FEMININO' ou 'MASCULINO'.".to_string(),
                    );
                })
                .ok()
        });
        let phone = filled(self.phone.as_ref())
            .map(|p| p.chars().filter(char::is_ascii_digit).collect::<String>())
            .filter(|p| !p.is_empty());

        CustomerUpdate {
            first_name: filled(self.first_name.as_ref()),
            last_name: filled(self.last_name.as_ref()),
            email,
            phone,
            cpf,
            birth_date: filled(self.birth_date.as_ref()),
            gender,
        }
    }
}

impl ShippingPatch {
    fn resolve(&self) -> Option<ShippingUpdate> {
        let cep = filled(self.postal_code.as_ref())?;
        Some(ShippingUpdate {
            cep,
            street: filled(self.address1.as_ref()).unwrap_or_default(),
            number: filled(self.address2.as_ref()).unwrap_or_default(),
            complement: filled(self.address2_complement.as_ref()),
            district: filled(self.district.as_ref()),
            city: filled(self.city.as_ref()),
            state: filled(self.state.as_ref()),
        })
    }
}

impl OrderPatch {
    /// Validate the patch.
    ///
    /// # Errors
    ///
    /// Returns every invalid field, keyed by its path in the body.
    pub fn resolve(&self) -> Result<OrderUpdate, FieldErrors> {
        let mut errors = FieldErrors::new();

        let customer = self
            .customer
            .as_ref()
            .map(|c| c.resolve(&mut errors))
            .unwrap_or_default();

        let status = filled(self.status.as_ref()).and_then(|raw| {
            OrderStatus::from_str(&raw)
                .map_err(|_| {
                    errors.insert("status".to_string(), "Status inválido.".to_string());
                })
                .ok()
        });

        let total = match &self.total {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value) => {
                let cents = parse_money(value).filter(|c| c.as_i64() >= 0);
                if cents.is_none() {
                    errors.insert("total".to_string(), "Valor total inválido.".to_string());
                }
                cents
            }
        };

        let created_at = filled(self.created_at.as_ref()).and_then(|raw| {
            let parsed = parse_timestamp(&raw);
            if parsed.is_none() {
                errors.insert("createdAt".to_string(), "Data inválida.".to_string());
            }
            parsed
        });

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(OrderUpdate {
            customer,
            shipping: self.shipping.as_ref().and_then(ShippingPatch::resolve),
            status,
            category: filled(self.category.as_ref()),
            total,
            created_at,
            payment_method: filled(self.payment_method.as_ref())
                .map(|m| PaymentMethod::parse_lenient(&m)),
            tracking_code: filled(self.tracking_code.as_ref()),
        })
    }
}
