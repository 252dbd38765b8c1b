//! Business logic between the HTTP handlers and the repositories.
//!
//! - [`checkout`] - Charging orders and applying status transitions
//! - [`dashboard`] - Aggregates for the admin dashboard
//! - [`email`] - Order lifecycle e-mails over SMTP
//! - [`links`] - Shareable product URLs
//! - [`order_status`] - Customer-facing order lookup
//! - [`payments`] - Asaas gateway client
//! - [`store`] - Order persistence seam used by checkout and lookup

pub mod checkout;
pub mod dashboard;
pub mod email;
pub mod links;
pub mod order_status;
pub mod payments;
pub mod store;

pub use checkout::CheckoutService;
pub use email::{Mailer, Notifier};
pub use payments::{AsaasClient, PaymentProvider};
pub use store::OrderStore;
