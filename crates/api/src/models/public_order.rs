//! Public checkout payload and its validation.
//!
//! Landing pages post loosely-typed JSON (numbers sometimes arrive as
//! strings), so the request is deserialized leniently and every field error
//! is collected before anything is written.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use dermosul_core::{Cents, Cpf, Email, Gender, OrderStatus, PaymentMethod};

use super::FieldErrors;

/// Raw public order request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOrderRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub cep: Option<String>,
    pub address: Option<String>,
    pub address_number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub gender: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub product_id: Option<Value>,
    pub product_title: Option<String>,
    pub product_price: Option<Value>,
    pub qty: Option<Value>,
    pub payment_method: Option<String>,
    pub status: Option<String>,
    pub external_reference: Option<String>,
    pub installments: Option<Value>,
}

/// Customer fields of a validated order.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub phone: String,
    pub cpf: Cpf,
    pub birth_date: String,
    pub gender: Gender,
}

#[derive(Debug, Clone)]
pub struct NewAddress {
    pub cep: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub sku: String,
    pub name: String,
    pub qty: i32,
    pub unit_price: Cents,
}

/// A validated public order, ready to persist.
#[derive(Debug, Clone)]
pub struct NewPublicOrder {
    pub customer: NewCustomer,
    pub address: NewAddress,
    pub item: NewItem,
    pub total: Cents,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub external_reference: Option<String>,
    pub installments: i32,
}

fn required(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn digits(value: Option<&String>) -> String {
    value
        .map(|v| v.chars().filter(char::is_ascii_digit).collect())
        .unwrap_or_default()
}

/// Reads a JSON number or numeric string as text.
fn numeric_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn positive_int(value: Option<&Value>) -> Option<i32> {
    numeric_text(value)?.parse::<i32>().ok().filter(|n| *n > 0)
}

fn positive_decimal(value: Option<&Value>) -> Option<Decimal> {
    let text = numeric_text(value)?;
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .filter(|d| d.is_sign_positive() && !d.is_zero())
}

/// Checks a `YYYY-MM-DD` birth date. Returns the error message, if any.
fn birth_date_error(raw: &str) -> Option<&'static str> {
    let parts: Vec<&str> = raw.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return Some("Formato de data inválido. Use YYYY-MM-DD.");
    };
    let (Ok(year), Ok(month), Ok(day)) = (year.parse(), month.parse(), day.parse()) else {
        return Some("Formato de data inválido. Use YYYY-MM-DD.");
    };
    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Some("Data de nascimento inválida (ex: 31/02 não existe).");
    }
    None
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("Invalid regex"));

impl PublicOrderRequest {
    /// Validate and normalize the request.
    ///
    /// # Errors
    ///
    /// Returns every field error found, keyed by request field name.
    pub fn validate(&self) -> Result<NewPublicOrder, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut fail = |field: &str, message: &str| {
            errors.insert(field.to_string(), message.to_string());
        };

        let first_name = required(self.first_name.as_ref());
        if first_name.is_none() {
            fail("firstName", "Nome é obrigatório.");
        }
        let last_name = required(self.last_name.as_ref());
        if last_name.is_none() {
            fail("lastName", "Sobrenome é obrigatório.");
        }

        let email = required(self.email.as_ref())
            .filter(|e| EMAIL_RE.is_match(e))
            .and_then(|e| Email::parse(&e).ok());
        if email.is_none() {
            fail("email", "Email inválido.");
        }

        let cep = required(self.cep.as_ref());
        if cep.is_none() {
            fail("cep", "CEP é obrigatório.");
        }
        let street = required(self.address.as_ref());
        if street.is_none() {
            fail("address", "Rua é obrigatória.");
        }
        let number = required(self.address_number.as_ref());
        if number.is_none() {
            fail("addressNumber", "Número é obrigatório.");
        }
        let district = required(self.district.as_ref());
        if district.is_none() {
            fail("district", "Bairro é obrigatório.");
        }
        let city = required(self.city.as_ref());
        if city.is_none() {
            fail("city", "Cidade é obrigatória.");
        }
        let state = required(self.state.as_ref());
        if state.is_none() {
            fail("state", "Estado é obrigatório.");
        }

        let gender = match required(self.gender.as_ref()) {
            None => {
                fail("gender", "Gênero é obrigatório.");
                None
            }
            Some(raw) => {
                let parsed = Gender::from_str(&raw).ok();
                if parsed.is_none() {
                    fail("gender", "Gênero inválido. Use 'FEMININO' ou 'MASCULINO'.");
                }
                parsed
            }
        };

        let cpf = Cpf::parse(&digits(self.cpf.as_ref())).ok();
        if cpf.is_none() {
            fail("cpf", "CPF inválido.");
        }

        let phone = digits(self.phone.as_ref());
        if phone.len() < 10 {
            fail("phone", "Telefone inválido (mínimo 10 dígitos).");
        }

        let birth_date = required(self.birth_date.as_ref());
        match birth_date.as_deref() {
            None => fail("birthDate", "Data de nascimento é obrigatória."),
            Some(raw) => {
                if let Some(message) = birth_date_error(raw) {
                    fail("birthDate", message);
                }
            }
        }

        let sku = numeric_text(self.product_id.as_ref()).filter(|s| !s.is_empty());
        if sku.is_none() {
            fail("productId", "ID do produto é obrigatório.");
        }
        let name = required(self.product_title.as_ref());
        if name.is_none() {
            fail("productTitle", "Título do produto é obrigatório.");
        }
        let qty = positive_int(self.qty.as_ref());
        if qty.is_none() {
            fail("qty", "Quantidade deve ser um número positivo.");
        }
        let unit_price = positive_decimal(self.product_price.as_ref()).and_then(Cents::from_reais);
        if unit_price.is_none() {
            fail("productPrice", "Preço do produto deve ser um número positivo.");
        }

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => OrderStatus::Pendente,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                fail("status", "Status inválido.");
                OrderStatus::Pendente
            }),
        };

        let (
            Some(first_name),
            Some(last_name),
            Some(email),
            Some(cep),
            Some(street),
            Some(number),
            Some(district),
            Some(city),
            Some(state),
            Some(gender),
            Some(cpf),
            Some(birth_date),
            Some(sku),
            Some(name),
            Some(qty),
            Some(unit_price),
        ) = (
            first_name, last_name, email, cep, street, number, district, city, state, gender, cpf,
            birth_date, sku, name, qty, unit_price,
        )
        else {
            return Err(errors);
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        let payment_method = self
            .payment_method
            .as_deref()
            .map_or(PaymentMethod::Cartao, PaymentMethod::parse_lenient);

        Ok(NewPublicOrder {
            customer: NewCustomer {
                first_name,
                last_name,
                email,
                phone,
                cpf,
                birth_date,
                gender,
            },
            address: NewAddress {
                cep,
                street,
                number,
                complement: self
                    .complement
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string(),
                district,
                city,
                state,
            },
            total: unit_price * i64::from(qty),
            item: NewItem {
                sku,
                name,
                qty,
                unit_price,
            },
            payment_method,
            status,
            external_reference: required(self.external_reference.as_ref()),
            installments: positive_int(self.installments.as_ref()).unwrap_or(1),
        })
    }
}
