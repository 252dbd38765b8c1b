//! Order persistence as seen by the checkout and status services.
//!
//! [`OrderStore`] is implemented for [`PgPool`] by delegating to
//! [`OrderRepository`]; tests use an in-memory store.

use async_trait::async_trait;
use sqlx::PgPool;

use dermosul_core::{OrderId, OrderStatus, PaymentStatus};

use crate::db::{OrderRepository, RepositoryError};
use crate::models::OrderDetails;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: &OrderId) -> Result<Option<OrderDetails>, RepositoryError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<OrderDetails>, RepositoryError>;

    /// Exact match on id or external reference.
    async fn find_by_code(&self, code: &str) -> Result<Option<OrderDetails>, RepositoryError>;

    /// Case-insensitive prefix match on id or external reference.
    async fn search_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<OrderDetails>, RepositoryError>;

    /// Store `reference` unless the order already has one; returns the
    /// stored reference.
    async fn ensure_reference(
        &self,
        id: &OrderId,
        reference: &str,
    ) -> Result<String, RepositoryError>;

    async fn set_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), RepositoryError>;

    async fn set_payments_status(
        &self,
        id: &OrderId,
        status: PaymentStatus,
    ) -> Result<u64, RepositoryError>;

    async fn record_charge(
        &self,
        id: &OrderId,
        gateway_payment_id: Option<&str>,
        gateway_status: &str,
        payment_status: PaymentStatus,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
impl OrderStore for PgPool {
    async fn get(&self, id: &OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        OrderRepository::new(self).get(id).await
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<OrderDetails>, RepositoryError> {
        OrderRepository::new(self).find_by_reference(reference).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<OrderDetails>, RepositoryError> {
        OrderRepository::new(self).find_by_code(code).await
    }

    async fn search_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<OrderDetails>, RepositoryError> {
        OrderRepository::new(self).search_prefix(prefix, limit).await
    }

    async fn ensure_reference(
        &self,
        id: &OrderId,
        reference: &str,
    ) -> Result<String, RepositoryError> {
        OrderRepository::new(self).ensure_reference(id, reference).await
    }

    async fn set_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        OrderRepository::new(self).set_status(id, status).await
    }

    async fn set_payments_status(
        &self,
        id: &OrderId,
        status: PaymentStatus,
    ) -> Result<u64, RepositoryError> {
        OrderRepository::new(self)
            .set_payments_status(id, status)
            .await
    }

    async fn record_charge(
        &self,
        id: &OrderId,
        gateway_payment_id: Option<&str>,
        gateway_status: &str,
        payment_status: PaymentStatus,
    ) -> Result<(), RepositoryError> {
        OrderRepository::new(self)
            .record_charge(id, gateway_payment_id, gateway_status, payment_status)
            .await
    }
}
