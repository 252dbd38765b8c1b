//! Product link command.

use dermosul_api::config::PublicOrigins;
use dermosul_api::services::links::{LinkOptions, ProductRef, ProductUrlError, build_product_url};

/// Print a product URL to stdout.
///
/// # Errors
///
/// Returns `ProductUrlError::MissingIdentifier` if no slug, id or path is
/// given.
pub fn product_url(
    slug: Option<&str>,
    id: Option<&str>,
    path: Option<&str>,
    base: Option<&str>,
    include_utm: bool,
) -> Result<(), ProductUrlError> {
    dotenvy::dotenv().ok();

    let product = ProductRef { slug, id, path };
    let options = LinkOptions {
        base_override: base,
        include_utm,
        ..LinkOptions::default()
    };
    let url = build_product_url(&product, &PublicOrigins::from_env(), &options)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{url}");
    }
    Ok(())
}
