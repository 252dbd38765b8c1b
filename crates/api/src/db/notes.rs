//! Admin notes attached to orders.

use sqlx::PgPool;

use dermosul_core::OrderId;

use super::RepositoryError;

/// Repository for order notes.
pub struct NoteRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NoteRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Notes for an order, empty when none were written.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, order_id: &OrderId) -> Result<String, RepositoryError> {
        let notes: Option<String> =
            sqlx::query_scalar("SELECT notes FROM dermosul.order_notes WHERE order_id = $1")
                .bind(order_id)
                .fetch_optional(self.pool)
                .await?;

        Ok(notes.unwrap_or_default())
    }

    /// Replace the notes of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn set(&self, order_id: &OrderId, notes: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO dermosul.order_notes (order_id, notes)
            VALUES ($1, $2)
            ON CONFLICT (order_id) DO UPDATE SET notes = EXCLUDED.notes, updated_at = NOW()
            ",
        )
        .bind(order_id)
        .bind(notes)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        Ok(())
    }
}
