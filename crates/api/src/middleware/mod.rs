//! HTTP middleware for the API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS
//!
//! Admin routes are guarded per handler by the [`RequireAdmin`] extractor.

pub mod auth;
pub mod request_id;

pub use auth::{RequireAdmin, constant_time_compare};
pub use request_id::request_id_middleware;
