//! Customer and address repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use dermosul_core::{AddressId, CustomerId, Email, Gender};

use super::RepositoryError;
use crate::models::Address;
use crate::models::Customer;
use crate::models::order_update::{CustomerUpdate, ShippingUpdate};
use crate::models::public_order::{NewAddress, NewCustomer};

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i32,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    cpf: Option<String>,
    birth_date: Option<String>,
    gender: Option<Gender>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: CustomerId::new(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            email,
            phone: row.phone,
            cpf: row.cpf,
            birth_date: row.birth_date,
            gender: row.gender,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AddressRow {
    pub(crate) customer_id: i32,
    id: i32,
    cep: String,
    street: String,
    number: String,
    complement: String,
    district: String,
    city: String,
    state: String,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Self {
            id: AddressId::new(row.id),
            cep: row.cep,
            street: row.street,
            number: row.number,
            complement: row.complement,
            district: row.district,
            city: row.city,
            state: row.state,
        }
    }
}

const CUSTOMER_COLUMNS: &str =
    "id, first_name, last_name, email, phone, cpf, birth_date, gender, created_at";

const ADDRESS_COLUMNS: &str =
    "customer_id, id, cep, street, number, complement, district, city, state";

/// Insert or refresh the customer matching the e-mail or CPF.
pub(crate) async fn upsert_in(
    conn: &mut PgConnection,
    customer: &NewCustomer,
) -> Result<CustomerId, RepositoryError> {
    let existing: Option<i32> = sqlx::query_scalar(
        r"
        SELECT id FROM dermosul.customers
        WHERE email = $1 OR cpf = $2
        ORDER BY (email = $1) DESC, id
        LIMIT 1
        ",
    )
    .bind(customer.email.as_str())
    .bind(customer.cpf.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let id = if let Some(id) = existing {
        sqlx::query(
            r"
            UPDATE dermosul.customers
            SET first_name = $2, last_name = $3, email = $4, phone = $5,
                cpf = $6, birth_date = $7, gender = $8, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(customer.email.as_str())
        .bind(&customer.phone)
        .bind(customer.cpf.as_str())
        .bind(&customer.birth_date)
        .bind(customer.gender)
        .execute(&mut *conn)
        .await
        .map_err(|e| RepositoryError::unique(e, "email or cpf belongs to another customer"))?;
        tracing::debug!(customer_id = id, "Customer updated");
        id
    } else {
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO dermosul.customers
                (first_name, last_name, email, phone, cpf, birth_date, gender)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(customer.email.as_str())
        .bind(&customer.phone)
        .bind(customer.cpf.as_str())
        .bind(&customer.birth_date)
        .bind(customer.gender)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::unique(e, "customer already exists"))?;
        tracing::debug!(customer_id = id, "Customer created");
        id
    };

    Ok(CustomerId::new(id))
}

/// Always inserts; public checkouts keep every address they were sent.
pub(crate) async fn insert_address_in(
    conn: &mut PgConnection,
    customer_id: CustomerId,
    address: &NewAddress,
) -> Result<AddressId, RepositoryError> {
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO dermosul.addresses
            (customer_id, cep, street, number, complement, district, city, state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        ",
    )
    .bind(customer_id.as_i32())
    .bind(&address.cep)
    .bind(&address.street)
    .bind(&address.number)
    .bind(&address.complement)
    .bind(&address.district)
    .bind(&address.city)
    .bind(&address.state)
    .fetch_one(&mut *conn)
    .await?;

    Ok(AddressId::new(id))
}

/// Repository for customer database operations.
pub struct CustomerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CustomerRepository<'a> {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Customers by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored e-mail is invalid.
    pub async fn get_many(&self, ids: &[i32]) -> Result<Vec<Customer>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM dermosul.customers WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Customer::try_from).collect()
    }

    /// Most recent address of each customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_addresses(
        &self,
        customer_ids: &[i32],
    ) -> Result<Vec<(CustomerId, Address)>, RepositoryError> {
        if customer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<AddressRow> = sqlx::query_as(&format!(
            r"
            SELECT DISTINCT ON (customer_id) {ADDRESS_COLUMNS}
            FROM dermosul.addresses
            WHERE customer_id = ANY($1)
            ORDER BY customer_id, created_at DESC, id DESC
            "
        ))
        .bind(customer_ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (CustomerId::new(row.customer_id), Address::from(row)))
            .collect())
    }

    /// Apply non-empty fields of `update` to the customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the new e-mail or CPF belongs
    /// to another customer.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> Result<(), RepositoryError> {
        if update.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r"
            UPDATE dermosul.customers
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                cpf = COALESCE($6, cpf),
                birth_date = COALESCE($7, birth_date),
                gender = COALESCE($8, gender),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.email.as_ref().map(Email::as_str))
        .bind(update.phone.as_deref())
        .bind(update.cpf.as_ref().map(|c| c.as_str().to_string()))
        .bind(update.birth_date.as_deref())
        .bind(update.gender)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "email or cpf belongs to another customer"))?;

        Ok(())
    }

    /// Update the address matching cep, street and number, or add a new one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn upsert_address(
        &self,
        customer_id: CustomerId,
        shipping: &ShippingUpdate,
    ) -> Result<AddressId, RepositoryError> {
        let updated: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE dermosul.addresses
            SET complement = COALESCE($5, complement),
                district = COALESCE($6, district),
                city = COALESCE($7, city),
                state = COALESCE($8, state)
            WHERE id = (
                SELECT id FROM dermosul.addresses
                WHERE customer_id = $1 AND cep = $2 AND street = $3 AND number = $4
                ORDER BY created_at DESC
                LIMIT 1
            )
            RETURNING id
            ",
        )
        .bind(customer_id.as_i32())
        .bind(&shipping.cep)
        .bind(&shipping.street)
        .bind(&shipping.number)
        .bind(shipping.complement.as_deref())
        .bind(shipping.district.as_deref())
        .bind(shipping.city.as_deref())
        .bind(shipping.state.as_deref())
        .fetch_optional(self.pool)
        .await?;

        if let Some(id) = updated {
            return Ok(AddressId::new(id));
        }

        let mut conn = self.pool.acquire().await?;
        insert_address_in(
            &mut conn,
            customer_id,
            &NewAddress {
                cep: shipping.cep.clone(),
                street: shipping.street.clone(),
                number: shipping.number.clone(),
                complement: shipping.complement.clone().unwrap_or_default(),
                district: shipping.district.clone().unwrap_or_default(),
                city: shipping.city.clone().unwrap_or_default(),
                state: shipping.state.clone().unwrap_or_default(),
            },
        )
        .await
    }
}
