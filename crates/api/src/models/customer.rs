//! Customer and address domain types.

use chrono::{DateTime, Utc};

use dermosul_core::{AddressId, CustomerId, Email, Gender};

/// A store customer.
#[derive(Debug, Clone)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    /// Digits only.
    pub phone: String,
    /// 11 bare digits, absent for imported customers.
    pub cpf: Option<String>,
    /// `YYYY-MM-DD`
    pub birth_date: Option<String>,
    pub gender: Option<Gender>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// First and last name joined by a space, or `Cliente` when both are blank.
    #[must_use]
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name)
    }
}

/// Joins name parts, falling back to `Cliente`.
#[must_use]
pub fn display_name(first: &str, last: &str) -> String {
    let joined = format!("{} {}", first.trim(), last.trim());
    let joined = joined.trim();
    if joined.is_empty() {
        "Cliente".to_string()
    } else {
        joined.to_string()
    }
}

/// A shipping address. A customer's most recent address ships their orders.
#[derive(Debug, Clone)]
pub struct Address {
    pub id: AddressId,
    pub cep: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    pub city: String,
    pub state: String,
}

impl Address {
    /// `district, city, state` with blank parts dropped.
    #[must_use]
    pub fn destination(&self) -> String {
        [&self.district, &self.city, &self.state]
            .into_iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
