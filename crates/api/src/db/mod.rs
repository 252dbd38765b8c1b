//! Database operations for the Dermosul `PostgreSQL` database.
//!
//! # Schema: `dermosul`
//!
//! ## Tables
//!
//! - `customers` - Buyers, unique by e-mail and by CPF
//! - `addresses` - Shipping addresses; the newest one ships the order
//! - `orders` - Orders keyed by an 8-digit code
//! - `order_items` - Line items
//! - `payments` - Payment attempts; the newest one is reported
//! - `order_notes` - Free-text admin notes per order
//! - `landing_pages` - One-product landing pages
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p dermosul-cli -- migrate
//! ```

pub mod customers;
pub mod dashboard;
pub mod landings;
pub mod notes;
pub mod orders;

pub use customers::CustomerRepository;
pub use dashboard::DashboardRepository;
pub use landings::LandingRepository;
pub use notes::NoteRepository;
pub use orders::{OrderFilter, OrderRepository, OrderSort};

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate slug).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique violations to `Conflict`, everything else to `Database`.
    pub(crate) fn unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
