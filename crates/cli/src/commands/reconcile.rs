//! Manual payment reconciliation.
//!
//! Same path as the storefront polling endpoint: ask Asaas for the payment
//! status and, when it is confirmed, mark the order paid and send the
//! confirmation e-mail.

use dermosul_api::db::create_pool;
use dermosul_api::{ApiConfig, AppState};

/// Reconcile one order.
///
/// # Errors
///
/// Returns an error if configuration is missing, the database is
/// unreachable, or the gateway call fails.
pub async fn run(reference: &str, payment_id: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ApiConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let state = AppState::new(config, pool)?;

    let result = state.checkout().reconcile(reference, payment_id).await?;
    let status = result.status.as_deref().unwrap_or("desconhecido");

    if result.paid {
        tracing::info!(reference, status, "Payment confirmed, order marked as paid");
    } else {
        tracing::warn!(reference, status, "Payment not confirmed yet");
    }
    Ok(())
}
