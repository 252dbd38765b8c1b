//! Payment gateway integration.
//!
//! Checkout talks to the gateway through [`PaymentProvider`] so handlers and
//! tests can swap the Asaas client for a fake. Card numbers and CVVs are
//! never logged.

mod asaas;
mod types;

pub use asaas::AsaasClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Message returned when a card charge comes back in a non-approved status.
pub const NOT_APPROVED: &str = "Payment was not approved.";

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway rejected the request. `message` is the gateway's own
    /// description when it sent one.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the gateway.
    #[error("Rate limited")]
    RateLimited,

    /// Invalid API key.
    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse a response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Charge was created but not approved.
    #[error("Declined: {0}")]
    Declined(String),

    /// Card charge requested without card data.
    #[error("Credit card details are required.")]
    MissingCard,

    /// Customer lookup or creation failed.
    #[error("Failed to process customer in Asaas.")]
    Customer(#[source] Box<PaymentError>),
}

impl PaymentError {
    /// Message safe to show the buyer.
    ///
    /// Gateway descriptions pass through; transport and parse failures
    /// collapse into `fallback`.
    #[must_use]
    pub fn message_or(&self, fallback: &str) -> String {
        match self {
            Self::Api { message, .. } if !message.is_empty() => message.clone(),
            Self::Declined(message) => message.clone(),
            Self::MissingCard => self.to_string(),
            _ => fallback.to_string(),
        }
    }

    /// Buyer-facing message with the generic card fallback.
    #[must_use]
    pub fn customer_message(&self) -> String {
        self.message_or("Failed to process payment.")
    }
}

/// A payment gateway.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Gateway customer id for the payer, creating the customer if needed.
    async fn find_or_create_customer(&self, payer: &PayerInfo) -> Result<String, PaymentError>;

    /// Charge a credit card.
    ///
    /// Returns `Declined` when the gateway answers with a status outside
    /// the approved set.
    async fn charge_card(&self, request: &CardChargeRequest) -> Result<Charge, PaymentError>;

    /// Create a PIX charge and fetch its QR code.
    async fn create_pix(&self, request: &PixChargeRequest) -> Result<PixCharge, PaymentError>;

    /// Latest charge for an external reference.
    async fn status_by_reference(&self, reference: &str) -> Result<PaymentLookup, PaymentError>;

    /// A charge by gateway id.
    async fn status_by_id(&self, payment_id: &str) -> Result<PaymentLookup, PaymentError>;
}
