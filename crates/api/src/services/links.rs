//! Product links shared with customers (chat recommendations, e-mails).
//!
//! The origin is resolved in order: explicit override, request origin, then
//! the configured `BASE_URL`, `STAGING_BASE_URL` and `DEV_BASE_URL`. With no
//! usable origin the link degrades to a relative path and a warning is
//! logged once per process.

use std::sync::atomic::{AtomicBool, Ordering};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use url::Url;

use crate::config::PublicOrigins;

const PRODUCT_PATH_PREFIX: &str = "/p/";

/// Characters escaped by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const UTM_PARAMS: [(&str, &str); 3] = [
    ("utm_source", "chat"),
    ("utm_medium", "assistente"),
    ("utm_campaign", "recomendacao"),
];

static WARNED_MISSING_BASE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProductUrlError {
    #[error("buildProductUrl: slug ou id são obrigatórios.")]
    MissingIdentifier,
}

/// What the link points at. `path` wins over `slug`, which wins over `id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductRef<'a> {
    pub slug: Option<&'a str>,
    pub id: Option<&'a str>,
    pub path: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct LinkOptions<'a> {
    pub base_override: Option<&'a str>,
    /// Origin of the incoming request, when there is one.
    pub request_origin: Option<&'a str>,
    pub include_utm: bool,
    /// Extra query parameters; `None` values are skipped.
    pub query: Vec<(&'a str, Option<String>)>,
}

impl Default for LinkOptions<'_> {
    fn default() -> Self {
        Self {
            base_override: None,
            request_origin: None,
            include_utm: true,
            query: Vec::new(),
        }
    }
}

/// `scheme://host[:port]` of a URL, or `None` if it does not parse.
fn sanitize_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let origin = url.origin();
    origin
        .is_tuple()
        .then(|| origin.ascii_serialization().trim_end_matches('/').to_string())
}

/// First usable origin in precedence order.
#[must_use]
pub fn resolve_origin(options: &LinkOptions<'_>, origins: &PublicOrigins) -> Option<String> {
    options
        .base_override
        .into_iter()
        .chain(options.request_origin)
        .chain(origins.candidates())
        .filter(|candidate| !candidate.trim().is_empty())
        .find_map(sanitize_origin)
}

fn product_path(product: &ProductRef<'_>) -> Result<String, ProductUrlError> {
    if let Some(path) = product.path.filter(|p| !p.is_empty()) {
        return Ok(if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        });
    }

    let target = product
        .slug
        .filter(|s| !s.is_empty())
        .or_else(|| product.id.filter(|s| !s.is_empty()))
        .ok_or(ProductUrlError::MissingIdentifier)?;

    Ok(format!(
        "{PRODUCT_PATH_PREFIX}{}",
        utf8_percent_encode(target, URI_COMPONENT)
    ))
}

/// Ordered query parameters; a repeated key replaces the earlier value in
/// place.
fn query_params(options: &LinkOptions<'_>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();
    let mut set = |key: &str, value: String| {
        if let Some(slot) = params.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            params.push((key.to_string(), value));
        }
    };

    if options.include_utm {
        for (key, value) in UTM_PARAMS {
            set(key, value.to_string());
        }
    }
    for (key, value) in &options.query {
        if let Some(value) = value {
            set(key, value.clone());
        }
    }
    params
}

fn warn_once(latch: &AtomicBool) -> bool {
    let first = !latch.swap(true, Ordering::Relaxed);
    if first {
        tracing::warn!(
            "BASE_URL/STAGING_BASE_URL/DEV_BASE_URL não configuradas. Retornando caminho relativo."
        );
    }
    first
}

/// Re-arm the missing-origin warning.
pub fn reset_missing_base_warning() {
    WARNED_MISSING_BASE.store(false, Ordering::Relaxed);
}

/// Build a shareable product URL.
///
/// # Errors
///
/// Returns `ProductUrlError::MissingIdentifier` when no path, slug or id is
/// given.
pub fn build_product_url(
    product: &ProductRef<'_>,
    origins: &PublicOrigins,
    options: &LinkOptions<'_>,
) -> Result<String, ProductUrlError> {
    let path = product_path(product)?;
    let params = query_params(options);

    if let Some(origin) = resolve_origin(options, origins)
        && let Ok(mut url) = Url::parse(&format!("{origin}{path}"))
    {
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(&params);
        }
        return Ok(url.to_string());
    }

    warn_once(&WARNED_MISSING_BASE);

    if params.is_empty() {
        return Ok(path);
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&params)
        .finish();
    Ok(format!("{path}?{query}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const UTM: &str = "utm_source=chat&utm_medium=assistente&utm_campaign=recomendacao";

    fn slug(s: &str) -> ProductRef<'_> {
        ProductRef {
            slug: Some(s),
            ..ProductRef::default()
        }
    }

    #[test]
    fn test_request_origin_wins_over_config() {
        let origins = PublicOrigins {
            base_url: Some("https://www.dermosul.com.br".to_string()),
            ..PublicOrigins::default()
        };
        let options = LinkOptions {
            request_origin: Some("http://localhost:5174"),
            ..LinkOptions::default()
        };
        let url = build_product_url(&slug("mascara-noite-repair"), &origins, &options).unwrap();
        assert_eq!(
            url,
            format!("http://localhost:5174/p/mascara-noite-repair?{UTM}")
        );
    }

    #[test]
    fn test_base_url_trailing_slash_is_dropped() {
        let origins = PublicOrigins {
            base_url: Some("https://www.minhaloja.com/".to_string()),
            staging_base_url: Some("https://staging.minhaloja.com".to_string()),
            ..PublicOrigins::default()
        };
        let url =
            build_product_url(&slug("serum-controle"), &origins, &LinkOptions::default()).unwrap();
        assert_eq!(url, format!("https://www.minhaloja.com/p/serum-controle?{UTM}"));
    }

    #[test]
    fn test_falls_back_to_staging() {
        let origins = PublicOrigins {
            staging_base_url: Some("https://staging.minhaloja.com/loja/".to_string()),
            ..PublicOrigins::default()
        };
        let url = build_product_url(&slug("kit-viagem"), &origins, &LinkOptions::default()).unwrap();
        assert_eq!(url, format!("https://staging.minhaloja.com/p/kit-viagem?{UTM}"));
    }

    #[test]
    fn test_invalid_override_is_skipped() {
        let origins = PublicOrigins {
            dev_base_url: Some("http://127.0.0.1:3000".to_string()),
            ..PublicOrigins::default()
        };
        let options = LinkOptions {
            base_override: Some("not a url"),
            ..LinkOptions::default()
        };
        let product = ProductRef {
            id: Some("12345"),
            ..ProductRef::default()
        };
        let url = build_product_url(&product, &origins, &options).unwrap();
        assert_eq!(url, format!("http://127.0.0.1:3000/p/12345?{UTM}"));
    }

    #[test]
    fn test_relative_path_is_encoded() {
        let url = build_product_url(
            &slug("mascara noturna"),
            &PublicOrigins::default(),
            &LinkOptions::default(),
        )
        .unwrap();
        assert_eq!(url, format!("/p/mascara%20noturna?{UTM}"));
    }

    #[test]
    fn test_slug_keeps_uri_component_marks() {
        let no_utm = LinkOptions {
            include_utm: false,
            ..LinkOptions::default()
        };
        let url = build_product_url(&slug("kit(2)!"), &PublicOrigins::default(), &no_utm).unwrap();
        assert_eq!(url, "/p/kit(2)!");

        let url = build_product_url(&slug("sérum*'~"), &PublicOrigins::default(), &no_utm).unwrap();
        assert_eq!(url, "/p/s%C3%A9rum*'~");

        let origins = PublicOrigins {
            base_url: Some("https://dermosul.com.br".to_string()),
            ..PublicOrigins::default()
        };
        let url = build_product_url(&slug("kit(2)!"), &origins, &no_utm).unwrap();
        assert_eq!(url, "https://dermosul.com.br/p/kit(2)!");
    }

    #[test]
    fn test_missing_origin_warns_once() {
        let latch = AtomicBool::new(false);
        assert!(warn_once(&latch));
        assert!(!warn_once(&latch));
        latch.store(false, Ordering::Relaxed);
        assert!(warn_once(&latch));
    }

    #[test]
    fn test_explicit_path_and_query() {
        let product = ProductRef {
            path: Some("l/serum"),
            slug: Some("ignored"),
            ..ProductRef::default()
        };
        let options = LinkOptions {
            include_utm: false,
            query: vec![
                ("ref", Some("chat".to_string())),
                ("skip", None),
                ("ref", Some("email".to_string())),
            ],
            ..LinkOptions::default()
        };
        let url = build_product_url(&product, &PublicOrigins::default(), &options).unwrap();
        assert_eq!(url, "/l/serum?ref=email");
    }

    #[test]
    fn test_extra_query_overrides_utm() {
        let options = LinkOptions {
            query: vec![("utm_source", Some("email".to_string()))],
            ..LinkOptions::default()
        };
        let url = build_product_url(&slug("kit"), &PublicOrigins::default(), &options).unwrap();
        assert_eq!(
            url,
            "/p/kit?utm_source=email&utm_medium=assistente&utm_campaign=recomendacao"
        );
    }

    #[test]
    fn test_no_identifier() {
        let err = build_product_url(
            &ProductRef::default(),
            &PublicOrigins::default(),
            &LinkOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, ProductUrlError::MissingIdentifier);
    }

    #[test]
    fn test_reset_rearms_warning() {
        reset_missing_base_warning();
        let url = build_product_url(&slug("a"), &PublicOrigins::default(), &LinkOptions::default());
        assert!(url.unwrap().starts_with("/p/a?"));
    }
}
