//! Integration tests for the Dermosul API.
//!
//! The tests talk to a running server over HTTP and are `#[ignore]`d by
//! default.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and apply migrations
//! cargo run -p dermosul-cli -- migrate
//!
//! # Start the API with a sandbox Asaas key
//! cargo run -p dermosul-api
//!
//! # Run integration tests
//! cargo test -p dermosul-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `DERMOSUL_API_URL` - API base URL (default: `http://localhost:3003`)
//! - `DERMOSUL_ADMIN_TOKEN` - Admin bearer token, same value the server uses

use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

/// Shared client and endpoints for one test.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    admin_token: Option<String>,
}

impl TestContext {
    /// Build a context from the environment.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn new() -> Self {
        let base_url = std::env::var("DERMOSUL_API_URL")
            .unwrap_or_else(|_| "http://localhost:3003".to_string());
        Self {
            client: Client::builder()
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_token: std::env::var("DERMOSUL_ADMIN_TOKEN").ok(),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Request carrying the admin bearer token, when one is configured.
    #[must_use]
    pub fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.admin_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// CPF that passes the check digits.
pub const TEST_CPF: &str = "529.982.247-25";

/// A complete public order body. `tag` keeps e-mails unique between runs.
#[must_use]
pub fn public_order(tag: &str, payment_method: &str) -> Value {
    json!({
        "firstName": "Ana",
        "lastName": "Teste",
        "email": format!("ana+{tag}@example.com"),
        "cep": "01310-100",
        "address": "Avenida Paulista",
        "addressNumber": "1000",
        "complement": "Conjunto 12",
        "district": "Bela Vista",
        "city": "São Paulo",
        "state": "SP",
        "gender": "FEMININO",
        "cpf": TEST_CPF,
        "phone": "(11) 98765-4321",
        "birthDate": "1990-05-17",
        "productId": "serum-vitamina-c",
        "productTitle": "Sérum Vitamina C 30ml",
        "productPrice": "149.90",
        "qty": 2,
        "paymentMethod": payment_method
    })
}
