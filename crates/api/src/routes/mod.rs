//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                 - Liveness
//! GET  /health/ready                           - Readiness (database)
//!
//! # Public
//! POST /api/orders/public                      - Create an order
//! POST /api/checkout                           - Create and charge an order
//! GET  /api/orders/{id}/status                 - Order status by id or reference
//! GET  /api/orders/lookup?message=             - Orders mentioned in a message
//! GET  /api/landings/{slug}                    - Landing page
//!
//! # Gateway
//! POST /api/payments/credit-card               - Raw card charge
//! POST /api/payments/pix                       - Raw PIX charge
//! GET  /api/payments/status/by-reference/{ref} - Poll and reconcile
//! POST /api/gateway/asaas/webhook              - Asaas webhook
//!
//! # Admin (Bearer token)
//! GET    /api/orders                           - Paginated list
//! GET    /api/orders/export                    - CSV export
//! GET|PATCH|DELETE /api/orders/{id}
//! GET|PATCH /api/orders/{id}/notes
//! GET|POST /api/landings
//! PUT|DELETE /api/landings/{id}
//! PATCH  /api/landings/{id}/status
//! GET    /api/overview, /api/revenueByDay, /api/ordersByCategory,
//!        /api/conversionByDay, /api/payments/breakdown
//! ```

pub mod dashboard;
pub mod landings;
pub mod orders;
pub mod payments;
pub mod public;

use axum::{Router, extract::State, http::StatusCode, routing::get};

use crate::state::AppState;

/// Build the complete router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(public::router())
        .merge(payments::router())
        .merge(orders::router())
        .merge(landings::router())
        .merge(dashboard::router())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, Response, header},
    };
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::tests::test_config;
    use crate::state::tests::{lazy_state, lazy_state_with};

    const ADMIN_TOKEN: &str = "k7Qp2vX9mL4tR8wZ1nB6cF3hJ5dG0sYa";

    fn app() -> Router {
        routes().with_state(lazy_state())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response: Response<Body> = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn admin_get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_readiness_without_database() {
        let (status, _) = send(app(), get("/health/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        for uri in ["/api/orders", "/api/overview", "/api/landings", "/api/orders/export"] {
            let (status, json) = send_json(app(), get(uri)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(json["error"], "unauthorized");
        }

        let request = Request::builder()
            .uri("/api/orders")
            .header(header::AUTHORIZATION, "Bearer wrong-token")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send_json(app(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["message"], "Token inválido.");
    }

    #[tokio::test]
    async fn test_bad_filters_fail_before_database() {
        let (status, json) = send_json(app(), admin_get("/api/orders?status=entregue")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "bad_request");

        let (status, _) = send_json(app(), admin_get("/api/orders?dateTo=ontem")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_public_order_validation() {
        let (status, json) = send_json(
            app(),
            post_json("/api/orders/public", &json!({ "firstName": "Ana", "qty": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_failed");
        assert!(json["details"]["email"].is_string());
        assert!(json["details"]["cpf"].is_string());
        assert!(json["details"].get("firstName").is_none());
    }

    #[tokio::test]
    async fn test_checkout_validation() {
        let (status, json) =
            send_json(app(), post_json("/api/checkout", &json!({ "paymentMethod": "pix" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_failed");
    }

    #[tokio::test]
    async fn test_lookup_requires_message() {
        let (status, json) = send_json(app(), get("/api/orders/lookup?message=%20")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Parâmetro message é obrigatório.");
    }

    #[tokio::test]
    async fn test_landing_status_validation() {
        let request = Request::builder()
            .method("PATCH")
            .uri("/api/landings/7/status")
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"status":"ARQUIVADA"}"#))
            .unwrap();
        let (status, json) = send_json(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Status inválido. Use 'ATIVA' ou 'PAUSADA'.");
    }

    #[tokio::test]
    async fn test_raw_charge_rejects_zero_amount() {
        let body = json!({
            "amount": 0,
            "customer": { "name": "Ana", "email": "ana@example.com", "cpf": "52998224725" },
            "externalReference": "lp-serum-1"
        });
        let (status, json) = send_json(app(), post_json("/api/payments/pix", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Valor inválido.");
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_events() {
        let body = json!({ "event": "PAYMENT_OVERDUE", "payment": { "externalReference": "x" } });
        let (status, bytes) = send(app(), post_json("/api/gateway/asaas/webhook", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"Webhook received");
    }

    #[tokio::test]
    async fn test_webhook_rejects_garbage() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/gateway/asaas/webhook")
            .body(Body::from("not json"))
            .unwrap();
        let (status, _) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_token_is_checked() {
        let mut config = test_config();
        config.asaas.webhook_token = Some(SecretString::from("whsec_dermosul"));
        let app = || routes().with_state(lazy_state_with(config.clone()));
        let body = json!({ "event": "PAYMENT_OVERDUE" });

        let (status, _) = send(app(), post_json("/api/gateway/asaas/webhook", &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = post_json("/api/gateway/asaas/webhook", &body);
        request
            .headers_mut()
            .insert("asaas-access-token", "whsec_dermosul".parse().unwrap());
        let (status, _) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
    }
}
