//! Order repository.
//!
//! Orders are always returned as [`OrderDetails`]: the order row plus its
//! customer, newest address, items and newest payment, loaded in batches.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use dermosul_core::{
    Cents, CustomerId, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentMethod, PaymentStatus,
};

use super::RepositoryError;
use super::customers::{self, CustomerRepository};
use crate::models::{NewPublicOrder, Order, OrderDetails, OrderItem, OrderUpdate, Payment};

/// Attempts at drawing an unused 8-digit order code.
const MAX_ID_ATTEMPTS: usize = 8;

const ORDER_COLUMNS: &str = "o.id, o.customer_id, o.external_reference, o.status, o.category, \
     o.total_cents, o.tracking_code, o.lp_status, o.gateway_payment_id, o.gateway_status, \
     o.created_at";

const ORDER_FROM: &str =
    " FROM dermosul.orders o JOIN dermosul.customers c ON c.id = o.customer_id";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    customer_id: i32,
    external_reference: Option<String>,
    status: OrderStatus,
    category: String,
    total_cents: Cents,
    tracking_code: Option<String>,
    lp_status: Option<String>,
    gateway_payment_id: Option<String>,
    gateway_status: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            customer_id: CustomerId::new(row.customer_id),
            external_reference: row.external_reference,
            status: row.status,
            category: row.category,
            total: row.total_cents,
            tracking_code: row.tracking_code,
            lp_status: row.lp_status,
            gateway_payment_id: row.gateway_payment_id,
            gateway_status: row.gateway_status,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: String,
    id: i32,
    sku: String,
    name: String,
    qty: i32,
    unit_price_cents: Cents,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    order_id: String,
    id: i32,
    method: PaymentMethod,
    status: PaymentStatus,
    paid_cents: Cents,
    installments: i32,
    created_at: DateTime<Utc>,
}

// =============================================================================
// Listing filters
// =============================================================================

/// Sort order for the admin order list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSort {
    DateAsc,
    #[default]
    DateDesc,
    ValueAsc,
    ValueDesc,
    ClientAsc,
    ClientDesc,
}

impl OrderSort {
    /// Parse `dateAsc`-style names or `field:dir` / `field,dir` pairs with
    /// field `createdAt`, `total` or `totalAmount`. Anything else sorts
    /// newest first.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "dateAsc" => return Self::DateAsc,
            "dateDesc" => return Self::DateDesc,
            "valueAsc" => return Self::ValueAsc,
            "valueDesc" => return Self::ValueDesc,
            "clientAsc" => return Self::ClientAsc,
            "clientDesc" => return Self::ClientDesc,
            _ => {}
        }

        let Some((field, dir)) = raw.split_once(':').or_else(|| raw.split_once(',')) else {
            return Self::default();
        };
        let ascending = match dir.trim().to_lowercase().as_str() {
            "asc" => true,
            "desc" => false,
            _ => return Self::default(),
        };
        match (field.trim(), ascending) {
            ("createdAt", true) => Self::DateAsc,
            ("createdAt", false) => Self::DateDesc,
            ("total" | "totalAmount", true) => Self::ValueAsc,
            ("total" | "totalAmount", false) => Self::ValueDesc,
            _ => Self::default(),
        }
    }

    const fn sql(self) -> &'static str {
        match self {
            Self::DateAsc => " ORDER BY o.created_at ASC, o.id",
            Self::DateDesc => " ORDER BY o.created_at DESC, o.id",
            Self::ValueAsc => " ORDER BY o.total_cents ASC, o.created_at DESC",
            Self::ValueDesc => " ORDER BY o.total_cents DESC, o.created_at DESC",
            Self::ClientAsc => " ORDER BY c.first_name ASC, c.last_name ASC, o.created_at DESC",
            Self::ClientDesc => " ORDER BY c.first_name DESC, c.last_name DESC, o.created_at DESC",
        }
    }
}

/// Admin order list filters.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Substring of the category.
    pub category: Option<String>,
    pub date_from: Option<NaiveDate>,
    /// Inclusive.
    pub date_to: Option<NaiveDate>,
    /// Substring of the order id or the customer's first or last name.
    pub q: Option<String>,
    pub sort: OrderSort,
}

impl OrderFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");
        if let Some(status) = self.status {
            qb.push(" AND o.status = ").push_bind(status);
        }
        if let Some(category) = &self.category {
            qb.push(" AND o.category ILIKE '%' || ")
                .push_bind(category.clone())
                .push(" || '%'");
        }
        if let Some(from) = self.date_from {
            qb.push(" AND o.created_at::date >= ").push_bind(from);
        }
        if let Some(to) = self.date_to {
            qb.push(" AND o.created_at::date <= ").push_bind(to);
        }
        if let Some(q) = &self.q {
            qb.push(" AND (o.id ILIKE '%' || ")
                .push_bind(q.clone())
                .push(" || '%' OR c.first_name ILIKE '%' || ")
                .push_bind(q.clone())
                .push(" || '%' OR c.last_name ILIKE '%' || ")
                .push_bind(q.clone())
                .push(" || '%')");
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Attach customers, addresses, items and payments to order rows,
    /// preserving row order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<OrderDetails>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<String> = rows.iter().map(|r| r.id.to_string()).collect();
        let mut customer_ids: Vec<i32> = rows.iter().map(|r| r.customer_id).collect();
        customer_ids.sort_unstable();
        customer_ids.dedup();

        let customer_repo = CustomerRepository::new(self.pool);
        let customers: HashMap<i32, _> = customer_repo
            .get_many(&customer_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.as_i32(), c))
            .collect();
        let addresses: HashMap<i32, _> = customer_repo
            .latest_addresses(&customer_ids)
            .await?
            .into_iter()
            .map(|(id, a)| (id.as_i32(), a))
            .collect();

        let item_rows: Vec<ItemRow> = sqlx::query_as(
            r"
            SELECT order_id, id, sku, name, qty, unit_price_cents
            FROM dermosul.order_items
            WHERE order_id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&order_ids)
        .fetch_all(self.pool)
        .await?;

        let mut items: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(OrderItem {
                id: OrderItemId::new(row.id),
                sku: row.sku,
                name: row.name,
                qty: row.qty,
                unit_price: row.unit_price_cents,
            });
        }

        let payment_rows: Vec<PaymentRow> = sqlx::query_as(
            r"
            SELECT DISTINCT ON (order_id)
                   order_id, id, method, status, paid_cents, installments, created_at
            FROM dermosul.payments
            WHERE order_id = ANY($1)
            ORDER BY order_id, created_at DESC, id DESC
            ",
        )
        .bind(&order_ids)
        .fetch_all(self.pool)
        .await?;

        let mut payments: HashMap<String, Payment> = payment_rows
            .into_iter()
            .map(|row| {
                (
                    row.order_id,
                    Payment {
                        id: PaymentId::new(row.id),
                        method: row.method,
                        status: row.status,
                        paid: row.paid_cents,
                        installments: row.installments,
                        created_at: row.created_at,
                    },
                )
            })
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let key = row.id.to_string();
                let customer_id = row.customer_id;
                OrderDetails {
                    customer: customers.get(&customer_id).cloned(),
                    shipping: addresses.get(&customer_id).cloned(),
                    items: items.remove(&key).unwrap_or_default(),
                    payment: payments.remove(&key),
                    order: Order::from(row),
                }
            })
            .collect())
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        bind: Vec<String>,
    ) -> Result<Option<OrderDetails>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS}{ORDER_FROM} WHERE {condition} LIMIT 1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(bind)
            .fetch_optional(self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Get an order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: &OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        self.fetch_one_where("o.id = ANY($1)", vec![id.to_string()])
            .await
    }

    /// Get an order by its external reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<OrderDetails>, RepositoryError> {
        self.fetch_one_where("o.external_reference = ANY($1)", vec![reference.to_string()])
            .await
    }

    /// Exact match on id or external reference, trying the code as given,
    /// upper-cased and lower-cased.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<OrderDetails>, RepositoryError> {
        let mut variants = vec![code.to_string(), code.to_uppercase(), code.to_lowercase()];
        variants.dedup();
        self.fetch_one_where(
            "(o.id = ANY($1) OR o.external_reference = ANY($1))",
            variants,
        )
        .await
    }

    /// Orders whose id or external reference starts with `prefix`, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn search_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<OrderDetails>, RepositoryError> {
        let pattern = format!("{}%", escape_like(prefix));
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS}{ORDER_FROM} \
             WHERE o.id ILIKE $1 OR o.external_reference ILIKE $1 \
             ORDER BY o.created_at DESC LIMIT $2"
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        self.hydrate(rows).await
    }

    /// One page of orders and the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        filter: &OrderFilter,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<OrderDetails>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*){ORDER_FROM}"));
        filter.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS}{ORDER_FROM}"));
        filter.push_where(&mut qb);
        qb.push(filter.sort.sql());
        qb.push(" LIMIT ").push_bind(page_size);
        qb.push(" OFFSET ")
            .push_bind(page.saturating_sub(1).saturating_mul(page_size));

        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(self.pool).await?;
        Ok((self.hydrate(rows).await?, total))
    }

    /// Every order matching the filter, for export.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_all(&self, filter: &OrderFilter) -> Result<Vec<OrderDetails>, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS}{ORDER_FROM}"));
        filter.push_where(&mut qb);
        qb.push(filter.sort.sql());

        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(self.pool).await?;
        self.hydrate(rows).await
    }

    /// Persist a validated public order in one transaction: upsert the
    /// customer, add the address, then create order, item and payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the external reference is
    /// already used or the e-mail/CPF pair clashes with two customers.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_public(
        &self,
        new_order: &NewPublicOrder,
    ) -> Result<OrderDetails, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let customer_id = customers::upsert_in(&mut tx, &new_order.customer).await?;
        customers::insert_address_in(&mut tx, customer_id, &new_order.address).await?;

        let mut order_id = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = OrderId::generate();
            let inserted: Option<String> = sqlx::query_scalar(
                r"
                INSERT INTO dermosul.orders
                    (id, customer_id, external_reference, status, category, total_cents)
                VALUES ($1, $2, $3, $4, 'Online', $5)
                ON CONFLICT (id) DO NOTHING
                RETURNING id
                ",
            )
            .bind(&candidate)
            .bind(customer_id.as_i32())
            .bind(new_order.external_reference.as_deref())
            .bind(new_order.status)
            .bind(new_order.total)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::unique(e, "external reference already used"))?;

            if inserted.is_some() {
                order_id = Some(candidate);
                break;
            }
        }
        let order_id = order_id.ok_or_else(|| {
            RepositoryError::Conflict("could not allocate an order code".to_owned())
        })?;

        sqlx::query(
            r"
            INSERT INTO dermosul.order_items (order_id, sku, name, qty, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&order_id)
        .bind(&new_order.item.sku)
        .bind(&new_order.item.name)
        .bind(new_order.item.qty)
        .bind(new_order.item.unit_price)
        .execute(&mut *tx)
        .await?;

        let payment_status = if new_order.status == OrderStatus::Pago {
            PaymentStatus::Confirmado
        } else {
            PaymentStatus::Pendente
        };
        sqlx::query(
            r"
            INSERT INTO dermosul.payments (order_id, method, status, paid_cents, installments)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&order_id)
        .bind(new_order.payment_method)
        .bind(payment_status)
        .bind(new_order.total)
        .bind(new_order.installments)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(order_id = %order_id, customer_id = %customer_id, "Public order created");

        self.get(&order_id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Set the external reference if the order has none. Returns the
    /// reference now stored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Conflict` if the reference is taken.
    pub async fn ensure_reference(
        &self,
        id: &OrderId,
        reference: &str,
    ) -> Result<String, RepositoryError> {
        let stored: Option<Option<String>> = sqlx::query_scalar(
            r"
            UPDATE dermosul.orders
            SET external_reference = COALESCE(external_reference, $2), updated_at = NOW()
            WHERE id = $1
            RETURNING external_reference
            ",
        )
        .bind(id)
        .bind(reference)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "external reference already used"))?;

        stored
            .ok_or(RepositoryError::NotFound)?
            .ok_or_else(|| RepositoryError::DataCorruption("external reference not stored".into()))
    }

    /// Set the order status only.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn set_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE dermosul.orders SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Set every payment of the order to `status`. Confirming also records
    /// the order total as paid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_payments_status(
        &self,
        id: &OrderId,
        status: PaymentStatus,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE dermosul.payments p
            SET status = $2,
                paid_cents = CASE WHEN $2 = 'confirmado'::dermosul.payment_status
                                  THEN o.total_cents ELSE p.paid_cents END
            FROM dermosul.orders o
            WHERE p.order_id = o.id AND o.id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Store the gateway's answer on the order and its newest payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn record_charge(
        &self,
        id: &OrderId,
        gateway_payment_id: Option<&str>,
        gateway_status: &str,
        payment_status: PaymentStatus,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            UPDATE dermosul.orders
            SET gateway_payment_id = COALESCE($2, gateway_payment_id),
                gateway_status = $3,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(gateway_payment_id)
        .bind(gateway_status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r"
            UPDATE dermosul.payments SET status = $2
            WHERE id = (
                SELECT id FROM dermosul.payments
                WHERE order_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            ",
        )
        .bind(id)
        .bind(payment_status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Apply admin edits to the order row and its newest payment's method.
    /// Customer and address edits go through [`CustomerRepository`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn update(&self, id: &OrderId, update: &OrderUpdate) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            UPDATE dermosul.orders
            SET status = COALESCE($2, status),
                category = COALESCE($3, category),
                total_cents = COALESCE($4, total_cents),
                created_at = COALESCE($5, created_at),
                tracking_code = COALESCE($6, tracking_code),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(update.status)
        .bind(update.category.as_deref())
        .bind(update.total)
        .bind(update.created_at)
        .bind(update.tracking_code.as_deref())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        if let Some(method) = update.payment_method {
            sqlx::query(
                r"
                UPDATE dermosul.payments SET method = $2
                WHERE id = (
                    SELECT id FROM dermosul.payments
                    WHERE order_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                )
                ",
            )
            .bind(id)
            .bind(method)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete an order with its items, payments and notes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM dermosul.orders WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Escape `LIKE` wildcards in user input.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_names() {
        assert_eq!(OrderSort::parse("dateAsc"), OrderSort::DateAsc);
        assert_eq!(OrderSort::parse("valueDesc"), OrderSort::ValueDesc);
        assert_eq!(OrderSort::parse("clientAsc"), OrderSort::ClientAsc);
    }

    #[test]
    fn test_sort_field_pairs() {
        assert_eq!(OrderSort::parse("createdAt:asc"), OrderSort::DateAsc);
        assert_eq!(OrderSort::parse("total,desc"), OrderSort::ValueDesc);
        assert_eq!(OrderSort::parse("totalAmount:ASC"), OrderSort::ValueAsc);
    }

    #[test]
    fn test_sort_fallback() {
        assert_eq!(OrderSort::parse(""), OrderSort::DateDesc);
        assert_eq!(OrderSort::parse("client:asc"), OrderSort::DateDesc);
        assert_eq!(OrderSort::parse("createdAt:sideways"), OrderSort::DateDesc);
    }

    #[test]
    fn test_filter_sql() {
        let filter = OrderFilter {
            status: Some(OrderStatus::Pago),
            category: Some("Online".to_string()),
            date_from: NaiveDate::from_ymd_opt(2026, 3, 1),
            date_to: None,
            q: Some("ana".to_string()),
            sort: OrderSort::ValueAsc,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        filter.push_where(&mut qb);
        qb.push(filter.sort.sql());
        let sql = qb.sql();

        assert!(sql.contains("o.status = $1"));
        assert!(sql.contains("o.category ILIKE '%' || $2 || '%'"));
        assert!(sql.contains("o.created_at::date >= $3"));
        assert!(!sql.contains("<="));
        assert!(sql.contains("c.last_name ILIKE '%' || $6 || '%'"));
        assert!(sql.ends_with("ORDER BY o.total_cents ASC, o.created_at DESC"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("04_8%"), "04\\_8\\%");
        assert_eq!(escape_like("lp-1"), "lp-1");
    }
}
