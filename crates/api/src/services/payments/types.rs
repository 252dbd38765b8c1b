//! Gateway-neutral payment types.

use core::fmt;

use serde::{Deserialize, Serialize};

use dermosul_core::{Cents, PaymentStatus};

/// Raw charge status reported by the gateway (e.g. `CONFIRMED`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayStatus(String);

impl GatewayStatus {
    pub const PENDING: &'static str = "PENDING";
    pub const CONFIRMED: &'static str = "CONFIRMED";
    pub const RECEIVED: &'static str = "RECEIVED";
    pub const RECEIVED_IN_CASH: &'static str = "RECEIVED_IN_CASH";
    pub const AWAITING_RISK_ANALYSIS: &'static str = "AWAITING_RISK_ANALYSIS";
    /// Synthetic status recorded for test-card purchases.
    pub const TEST_APPROVED: &'static str = "TEST_APPROVED";

    const PAID: [&'static str; 4] = [
        Self::CONFIRMED,
        Self::RECEIVED,
        Self::RECEIVED_IN_CASH,
        Self::TEST_APPROVED,
    ];

    const FAILED: [&'static str; 7] = [
        "REFUNDED",
        "REFUND_REQUESTED",
        "CHARGEBACK_REQUESTED",
        "CHARGEBACK_DISPUTE",
        "OVERDUE",
        "DELETED",
        "REPROVED_BY_RISK_ANALYSIS",
    ];

    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into().trim().to_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether money has been captured.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        Self::PAID.contains(&self.0.as_str())
    }

    /// Whether a card charge was accepted (paid or still under risk review).
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.is_paid() || self.0 == Self::AWAITING_RISK_ANALYSIS
    }

    /// Map to the local payment row status.
    ///
    /// Statuses the gateway may add later fall back to `pendente`.
    #[must_use]
    pub fn payment_status(&self) -> PaymentStatus {
        if self.is_paid() {
            PaymentStatus::Confirmado
        } else if self.0 == Self::AWAITING_RISK_ANALYSIS {
            PaymentStatus::Analise
        } else if Self::FAILED.contains(&self.0.as_str()) {
            PaymentStatus::Cancelado
        } else {
            if self.0 != Self::PENDING {
                tracing::warn!(gateway_status = %self.0, "Unknown gateway status, treating as pending");
            }
            PaymentStatus::Pendente
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Buyer data sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayerInfo {
    pub name: String,
    pub email: String,
    /// 11 bare digits.
    pub cpf: String,
    /// Digits only.
    pub phone: String,
    pub postal_code: Option<String>,
    pub address_number: Option<String>,
}

/// Card data as typed by the buyer.
///
/// Implements `Debug` manually so card numbers never reach logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub holder_name: String,
    pub number: String,
    pub expiry_month: String,
    pub expiry_year: String,
    #[serde(alias = "ccv")]
    pub cvv: String,
}

impl CardDetails {
    /// Card number without spaces or dashes.
    #[must_use]
    pub fn digits(&self) -> String {
        self.number.chars().filter(char::is_ascii_digit).collect()
    }

    #[must_use]
    pub fn last4(&self) -> String {
        let digits = self.digits();
        let skip = digits.len().saturating_sub(4);
        digits.chars().skip(skip).collect()
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("holder_name", &self.holder_name)
            .field("last4", &self.last4())
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

/// A credit-card charge.
#[derive(Debug, Clone)]
pub struct CardChargeRequest {
    pub amount: Cents,
    pub external_reference: String,
    /// Number of installments, 1 for a single payment.
    pub installments: u32,
    pub payer: PayerInfo,
    pub card: Option<CardDetails>,
}

/// A PIX charge.
#[derive(Debug, Clone)]
pub struct PixChargeRequest {
    pub amount: Cents,
    pub external_reference: String,
    pub payer: PayerInfo,
}

/// An accepted card charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub gateway_payment_id: String,
    pub status: GatewayStatus,
}

/// A PIX charge waiting for the buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixCharge {
    pub gateway_payment_id: String,
    pub status: GatewayStatus,
    /// Base64 PNG of the QR code, as returned by the gateway.
    pub qr_code: String,
    /// PIX copy-and-paste payload.
    pub copy_paste: String,
}

/// Result of polling a charge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaymentLookup {
    pub gateway_payment_id: Option<String>,
    pub status: Option<GatewayStatus>,
}

impl PaymentLookup {
    #[must_use]
    pub fn paid(&self) -> bool {
        self.status.as_ref().is_some_and(GatewayStatus::is_paid)
    }
}
