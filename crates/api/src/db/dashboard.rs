//! Read-only queries behind the dashboard charts.

use chrono::NaiveDate;
use sqlx::PgPool;

use dermosul_core::{Cents, OrderStatus, PaymentMethod};

use super::RepositoryError;

/// The slice of an order the dashboard aggregates over.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DashboardOrder {
    /// UTC calendar day the order was placed.
    pub day: NaiveDate,
    pub status: OrderStatus,
    pub category: Option<String>,
    pub total_cents: Cents,
}

/// Confirmed payment total for one method.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub paid_cents: Cents,
}

/// Repository for dashboard queries.
pub struct DashboardRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DashboardRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Orders placed on or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn orders_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<DashboardOrder>, RepositoryError> {
        let rows = sqlx::query_as(
            r"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
                   status,
                   NULLIF(category, '') AS category,
                   total_cents
            FROM dermosul.orders
            WHERE (created_at AT TIME ZONE 'UTC')::date >= $1
            ORDER BY created_at
            ",
        )
        .bind(since)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Confirmed payment totals by method for paid or shipped orders placed
    /// on or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn payments_by_method(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<MethodTotal>, RepositoryError> {
        let rows = sqlx::query_as(
            r"
            SELECT p.method, SUM(p.paid_cents)::BIGINT AS paid_cents
            FROM dermosul.payments p
            JOIN dermosul.orders o ON o.id = p.order_id
            WHERE p.status = 'confirmado'
              AND o.status IN ('pago', 'enviado')
              AND (o.created_at AT TIME ZONE 'UTC')::date >= $1
            GROUP BY p.method
            ORDER BY p.method
            ",
        )
        .bind(since)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }
}
