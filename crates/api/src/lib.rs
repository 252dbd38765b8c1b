//! Dermosul order, payment and notification API.
//!
//! Serves the storefront checkout, the Asaas payment gateway callbacks and
//! the admin dashboard on port 3003. The `dermosul-api` binary wires this
//! library into an HTTP server; the CLI reuses it for migrations and
//! manual reconciliation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::AppError;
pub use state::AppState;
