//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::{LandingRepository, RepositoryError};
use crate::models::LandingPage;
use crate::services::email::EmailError;
use crate::services::payments::PaymentError;
use crate::services::{AsaasClient, CheckoutService, Mailer, Notifier, PaymentProvider};

/// Error creating the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment gateway: {0}")]
    Gateway(#[from] PaymentError),
    #[error("mailer: {0}")]
    Mailer(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    /// Public landing pages by slug.
    landings: Cache<String, LandingPage>,
}

impl AppState {
    /// Build the state with the Asaas client and the SMTP mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway client or the mailer cannot be
    /// configured.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let payments = Arc::new(AsaasClient::new(&config.asaas)?);
        let mailer = Mailer::new(config.smtp.as_ref())?;
        if !mailer.is_enabled() {
            tracing::warn!("SMTP not configured, order e-mails are disabled");
        }
        Ok(Self::with_services(config, pool, payments, Arc::new(mailer)))
    }

    /// Build the state around explicit gateway and notifier implementations.
    #[must_use]
    pub fn with_services(
        config: ApiConfig,
        pool: PgPool,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let landings = Cache::builder()
            .max_capacity(500)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                payments,
                notifier,
                landings,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn payments(&self) -> &dyn PaymentProvider {
        self.inner.payments.as_ref()
    }

    /// Checkout service over the database.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_> {
        let config = self.config();
        CheckoutService::new(
            self.pool(),
            self.inner.payments.as_ref(),
            self.inner.notifier.as_ref(),
            &config.test_card,
            config.order_tracking_url.as_deref(),
        )
    }

    /// Landing page by slug, cached for five minutes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the lookup fails.
    pub async fn landing_by_slug(&self, slug: &str) -> Result<Option<LandingPage>, RepositoryError> {
        if let Some(page) = self.inner.landings.get(slug).await {
            tracing::debug!(slug, "Cache hit for landing page");
            return Ok(Some(page));
        }

        let page = LandingRepository::new(self.pool()).get_by_slug(slug).await?;
        if let Some(page) = &page {
            self.inner
                .landings
                .insert(slug.to_string(), page.clone())
                .await;
        }
        Ok(page)
    }

    /// Drop a cached landing page.
    pub async fn invalidate_landing(&self, slug: &str) {
        self.inner.landings.invalidate(slug).await;
    }
}
