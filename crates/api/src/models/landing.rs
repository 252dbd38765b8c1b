//! Landing pages (one product per page).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dermosul_core::{Cents, LandingPageId, LandingStatus};

pub const DEFAULT_TEMPLATE: &str = "MODELO_1";

/// A landing page row.
#[derive(Debug, Clone)]
pub struct LandingPage {
    pub id: LandingPageId,
    pub slug: String,
    pub template: String,
    pub title: String,
    pub brand: String,
    pub description: Option<String>,
    pub price: Cents,
    pub free_shipping: bool,
    pub shipping_price: Cents,
    pub image_url: Option<String>,
    pub status: LandingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LandingPage {
    /// Public path of the page.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/l/{}", self.slug)
    }
}

/// Dashboard and storefront representation of a landing page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingView {
    pub id: i32,
    pub slug: String,
    pub template: String,
    pub product_title: String,
    pub product_description: String,
    pub product_brand: String,
    pub product_price: f64,
    pub free_shipping: bool,
    pub image_url: String,
    pub shipping_value: f64,
    pub status: LandingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
}

impl From<&LandingPage> for LandingView {
    fn from(lp: &LandingPage) -> Self {
        Self {
            id: lp.id.as_i32(),
            slug: lp.slug.clone(),
            template: lp.template.clone(),
            product_title: lp.title.clone(),
            product_description: lp.description.clone().unwrap_or_default(),
            product_brand: lp.brand.clone(),
            product_price: lp.price.to_reais_f64(),
            free_shipping: lp.free_shipping,
            image_url: lp.image_url.clone().unwrap_or_default(),
            shipping_value: lp.shipping_price.to_reais_f64(),
            status: lp.status,
            created_at: lp.created_at,
            updated_at: lp.updated_at,
            url: lp.path(),
        }
    }
}

/// Create/update payload for a landing page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingInput {
    pub slug: Option<String>,
    pub template: Option<String>,
    pub product_title: Option<String>,
    pub product_brand: Option<String>,
    pub product_description: Option<String>,
    pub product_price: Option<Value>,
    #[serde(default)]
    pub free_shipping: bool,
    pub shipping_value: Option<Value>,
    pub image_url: Option<String>,
}

/// Validated landing page fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingFields {
    /// Explicit slug requested by the caller, if any.
    pub slug: Option<String>,
    pub template: Option<String>,
    pub title: String,
    pub brand: String,
    pub description: String,
    pub price: Cents,
    pub free_shipping: bool,
    pub shipping_price: Cents,
    pub image_url: Option<String>,
}

/// Which write the input is validated for. Updates require a positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingWrite {
    Create,
    Update,
}

fn decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl LandingInput {
    /// Validate the input.
    ///
    /// # Errors
    ///
    /// Returns the first validation message, in Portuguese.
    pub fn validate(&self, write: LandingWrite) -> Result<LandingFields, String> {
        let title = non_blank(self.product_title.as_ref())
            .ok_or_else(|| "Título do produto é obrigatório.".to_string())?;
        let brand = non_blank(self.product_brand.as_ref())
            .ok_or_else(|| "Marca é obrigatória.".to_string())?;

        let price = decimal(self.product_price.as_ref());
        let price = match write {
            LandingWrite::Create => price.filter(|p| !p.is_sign_negative()).ok_or_else(|| {
                "Preço do produto é obrigatório e deve ser um número.".to_string()
            })?,
            LandingWrite::Update => price.filter(|p| *p > Decimal::ZERO).ok_or_else(|| {
                "Preço do produto é obrigatório e deve ser um número positivo.".to_string()
            })?,
        };

        let shipping = if self.free_shipping {
            Decimal::ZERO
        } else {
            decimal(self.shipping_value.as_ref())
                .filter(|s| !s.is_sign_negative())
                .ok_or_else(|| {
                    "Valor do frete é obrigatório quando frete grátis não está marcado."
                        .to_string()
                })?
        };

        let out_of_range = || "Valor fora do intervalo permitido.".to_string();
        Ok(LandingFields {
            slug: non_blank(self.slug.as_ref()),
            template: non_blank(self.template.as_ref()),
            title,
            brand,
            description: self
                .product_description
                .as_deref()
                .unwrap_or_default()
                .to_string(),
            price: Cents::from_reais(price).ok_or_else(out_of_range)?,
            free_shipping: self.free_shipping,
            shipping_price: Cents::from_reais(shipping).ok_or_else(out_of_range)?,
            image_url: non_blank(self.image_url.as_ref()),
        })
    }
}

/// Derive a URL slug from a title.
///
/// Lowercases, turns whitespace runs into `-` and drops anything that is not
/// a word character or `-`.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_space = false;
    for ch in title.trim().to_lowercase().chars() {
        if ch.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            slug.push(ch);
        }
    }
    slug
}

/// Candidate slugs: the base, then `base-1`, `base-2`, ...
pub fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((1..).map(move |n| format!("{base}-{n}")))
}
