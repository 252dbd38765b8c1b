//! Landing page repository.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use dermosul_core::{Cents, LandingPageId, LandingStatus};

use super::RepositoryError;
use crate::models::LandingPage;
use crate::models::landing::{DEFAULT_TEMPLATE, LandingFields, slug_candidates, slugify};

#[derive(sqlx::FromRow)]
struct LandingRow {
    id: i32,
    slug: String,
    template: String,
    title: String,
    brand: String,
    description: Option<String>,
    price_cents: Cents,
    free_shipping: bool,
    shipping_price_cents: Cents,
    image_url: Option<String>,
    status: LandingStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LandingRow> for LandingPage {
    fn from(row: LandingRow) -> Self {
        Self {
            id: LandingPageId::new(row.id),
            slug: row.slug,
            template: row.template,
            title: row.title,
            brand: row.brand,
            description: row.description,
            price: row.price_cents,
            free_shipping: row.free_shipping,
            shipping_price: row.shipping_price_cents,
            image_url: row.image_url,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str = "id, slug, template, title, brand, description, price_cents, \
     free_shipping, shipping_price_cents, image_url, status, created_at, updated_at";

/// Repository for landing pages.
pub struct LandingRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LandingRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All landing pages, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<LandingPage>, RepositoryError> {
        let rows: Vec<LandingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM dermosul.landing_pages ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(LandingPage::from).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: LandingPageId) -> Result<Option<LandingPage>, RepositoryError> {
        let row: Option<LandingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM dermosul.landing_pages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(LandingPage::from))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<LandingPage>, RepositoryError> {
        let row: Option<LandingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM dermosul.landing_pages WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(LandingPage::from))
    }

    /// First free slug derived from `title`, ignoring the page `exclude`.
    async fn unique_slug(
        &self,
        title: &str,
        exclude: Option<LandingPageId>,
    ) -> Result<String, RepositoryError> {
        let base = slugify(title);
        let taken: HashSet<String> = sqlx::query_scalar(
            r"
            SELECT slug FROM dermosul.landing_pages
            WHERE (slug = $1 OR slug LIKE $1 || '-%')
              AND ($2::INTEGER IS NULL OR id <> $2)
            ",
        )
        .bind(&base)
        .bind(exclude.map(|id| id.as_i32()))
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .collect();

        let free = slug_candidates(&base).find(|candidate| !taken.contains(candidate));
        Ok(free.unwrap_or(base))
    }

    /// Create a landing page. The slug comes from the input or the title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if an explicit slug is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, fields: &LandingFields) -> Result<LandingPage, RepositoryError> {
        let slug = match &fields.slug {
            Some(slug) => slug.clone(),
            None => self.unique_slug(&fields.title, None).await?,
        };

        let row: LandingRow = sqlx::query_as(&format!(
            r"
            INSERT INTO dermosul.landing_pages
                (slug, template, title, brand, description, price_cents,
                 free_shipping, shipping_price_cents, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COLUMNS}
            "
        ))
        .bind(&slug)
        .bind(fields.template.as_deref().unwrap_or(DEFAULT_TEMPLATE))
        .bind(&fields.title)
        .bind(&fields.brand)
        .bind(&fields.description)
        .bind(fields.price)
        .bind(fields.free_shipping)
        .bind(fields.shipping_price)
        .bind(fields.image_url.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "slug already in use"))?;

        tracing::info!(landing_id = row.id, slug = %row.slug, "Landing page created");
        Ok(row.into())
    }

    /// Update a landing page. A new title regenerates the slug; template
    /// and image keep their stored values when absent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the page does not exist.
    pub async fn update(
        &self,
        id: LandingPageId,
        fields: &LandingFields,
    ) -> Result<(LandingPage, String), RepositoryError> {
        let existing = self.get(id).await?.ok_or(RepositoryError::NotFound)?;

        let slug = if fields.title == existing.title {
            existing.slug.clone()
        } else {
            self.unique_slug(&fields.title, Some(id)).await?
        };

        let row: LandingRow = sqlx::query_as(&format!(
            r"
            UPDATE dermosul.landing_pages
            SET slug = $2,
                template = COALESCE($3, template),
                title = $4,
                brand = $5,
                description = $6,
                price_cents = $7,
                free_shipping = $8,
                shipping_price_cents = $9,
                image_url = COALESCE($10, image_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(&slug)
        .bind(fields.template.as_deref())
        .bind(&fields.title)
        .bind(&fields.brand)
        .bind(&fields.description)
        .bind(fields.price)
        .bind(fields.free_shipping)
        .bind(fields.shipping_price)
        .bind(fields.image_url.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "slug already in use"))?;

        Ok((row.into(), existing.slug))
    }

    /// Set `ATIVA`/`PAUSADA`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the page does not exist.
    pub async fn set_status(
        &self,
        id: LandingPageId,
        status: LandingStatus,
    ) -> Result<LandingPage, RepositoryError> {
        let row: Option<LandingRow> = sqlx::query_as(&format!(
            r"
            UPDATE dermosul.landing_pages
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?;

        row.map(LandingPage::from).ok_or(RepositoryError::NotFound)
    }

    /// Delete a page, returning its slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the page does not exist.
    pub async fn delete(&self, id: LandingPageId) -> Result<String, RepositoryError> {
        let slug: Option<String> =
            sqlx::query_scalar("DELETE FROM dermosul.landing_pages WHERE id = $1 RETURNING slug")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        slug.ok_or(RepositoryError::NotFound)
    }
}
