//! Status enums for orders, payments, and landing pages.
//!
//! Wire and database spellings are the Portuguese values used by the
//! dashboard (`pendente`, `pago`, ...). No transition rules are enforced:
//! any status can replace any other.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a status string is not recognized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct StatusParseError {
    kind: &'static str,
    value: String,
}

impl StatusParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "dermosul.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pendente,
    AguardandoPagamento,
    Pago,
    Enviado,
    Cancelado,
}

impl OrderStatus {
    pub const ALL: [Self; 5] = [
        Self::Pendente,
        Self::AguardandoPagamento,
        Self::Pago,
        Self::Enviado,
        Self::Cancelado,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pendente => "pendente",
            Self::AguardandoPagamento => "aguardando_pagamento",
            Self::Pago => "pago",
            Self::Enviado => "enviado",
            Self::Cancelado => "cancelado",
        }
    }

    /// Human-readable label shown to customers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pendente => "Pendente",
            Self::AguardandoPagamento => "Aguardando pagamento",
            Self::Pago => "Pago",
            Self::Enviado => "Enviado",
            Self::Cancelado => "Cancelado",
        }
    }

    /// Whether the order counts as revenue (paid or already shipped).
    #[must_use]
    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Pago | Self::Enviado)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| StatusParseError::new("order status", s))
    }
}

/// Status of a payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "dermosul.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pendente,
    Confirmado,
    Analise,
    Cancelado,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pendente => "pendente",
            Self::Confirmado => "confirmado",
            Self::Analise => "analise",
            Self::Cancelado => "cancelado",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pendente" => Ok(Self::Pendente),
            "confirmado" => Ok(Self::Confirmado),
            "analise" => Ok(Self::Analise),
            "cancelado" => Ok(Self::Cancelado),
            _ => Err(StatusParseError::new("payment status", s)),
        }
    }
}

/// How an order was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "dermosul.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cartao,
    Pix,
    Boleto,
    #[default]
    Desconhecido,
}

impl PaymentMethod {
    /// Lenient parse used for dashboard input and imported data.
    ///
    /// Accepts the display names as well as the canonical values; anything
    /// unrecognized becomes [`PaymentMethod::Desconhecido`].
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "cartao" | "cartão" | "cartao de credito" | "cartão de crédito" | "credit_card" => {
                Self::Cartao
            }
            "pix" => Self::Pix,
            "boleto" => Self::Boleto,
            _ => Self::Desconhecido,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cartao => "cartao",
            Self::Pix => "pix",
            Self::Boleto => "boleto",
            Self::Desconhecido => "desconhecido",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cartao => "Cartão de crédito",
            Self::Pix => "PIX",
            Self::Boleto => "Boleto",
            Self::Desconhecido => "Desconhecido",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Landing page visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "dermosul.landing_status", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LandingStatus {
    #[default]
    Ativa,
    Pausada,
}

impl LandingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ativa => "ATIVA",
            Self::Pausada => "PAUSADA",
        }
    }
}

impl fmt::Display for LandingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LandingStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ATIVA" => Ok(Self::Ativa),
            "PAUSADA" => Ok(Self::Pausada),
            _ => Err(StatusParseError::new("landing status", s)),
        }
    }
}

/// Customer gender as collected at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "dermosul.gender", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Feminino,
    Masculino,
}

impl Gender {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feminino => "FEMININO",
            Self::Masculino => "MASCULINO",
        }
    }
}

impl FromStr for Gender {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FEMININO" => Ok(Self::Feminino),
            "MASCULINO" => Ok(Self::Masculino),
            _ => Err(StatusParseError::new("gender", s)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_labels() {
        let labels: Vec<_> = OrderStatus::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(
            labels,
            ["Pendente", "Aguardando pagamento", "Pago", "Enviado", "Cancelado"]
        );
    }

    #[test]
    fn test_order_status_parse() {
        assert_eq!("PAGO".parse::<OrderStatus>().unwrap(), OrderStatus::Pago);
        assert_eq!(
            " aguardando_pagamento ".parse::<OrderStatus>().unwrap(),
            OrderStatus::AguardandoPagamento
        );
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_serde() {
        let json = serde_json::to_string(&OrderStatus::AguardandoPagamento).unwrap();
        assert_eq!(json, "\"aguardando_pagamento\"");
    }

    #[test]
    fn test_paid_statuses() {
        assert!(OrderStatus::Pago.is_paid());
        assert!(OrderStatus::Enviado.is_paid());
        assert!(!OrderStatus::Pendente.is_paid());
        assert!(!OrderStatus::Cancelado.is_paid());
    }

    #[test]
    fn test_payment_method_lenient() {
        assert_eq!(PaymentMethod::parse_lenient("cartao"), PaymentMethod::Cartao);
        assert_eq!(
            PaymentMethod::parse_lenient("Cartão de Crédito"),
            PaymentMethod::Cartao
        );
        assert_eq!(PaymentMethod::parse_lenient("PIX"), PaymentMethod::Pix);
        assert_eq!(PaymentMethod::parse_lenient("boleto"), PaymentMethod::Boleto);
        assert_eq!(
            PaymentMethod::parse_lenient("dinheiro"),
            PaymentMethod::Desconhecido
        );
    }

    #[test]
    fn test_landing_status_is_strict() {
        assert_eq!("PAUSADA".parse::<LandingStatus>().unwrap(), LandingStatus::Pausada);
        assert!("pausada".parse::<LandingStatus>().is_err());
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("feminino".parse::<Gender>().unwrap(), Gender::Feminino);
        assert!("outro".parse::<Gender>().is_err());
    }
}
