//! Landing page CRUD and the public slug lookup.

use dermosul_integration_tests::TestContext;
use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_landing_lifecycle() {
    let ctx = TestContext::new();
    let title = format!("Protetor Solar FPS 50 {}", Uuid::new_v4().simple());

    let resp = ctx
        .admin(ctx.client.post(ctx.url("/api/landings")))
        .json(&json!({
            "productTitle": title,
            "productBrand": "Dermosul",
            "productPrice": "89.90",
            "freeShipping": true
        }))
        .send()
        .await
        .expect("Failed to create landing");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await.expect("Landing body is not JSON");
    let id = created["id"].as_i64().expect("id");
    let slug = created["slug"].as_str().expect("slug").to_string();
    assert_eq!(created["status"], "ATIVA");

    let resp = ctx
        .client
        .get(ctx.url(&format!("/api/landings/{slug}")))
        .send()
        .await
        .expect("Failed to read landing");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = ctx
        .admin(ctx.client.patch(ctx.url(&format!("/api/landings/{id}/status"))))
        .json(&json!({ "status": "PAUSADA" }))
        .send()
        .await
        .expect("Failed to pause landing");
    let paused: Value = resp.json().await.expect("Landing body is not JSON");
    assert_eq!(paused["status"], "PAUSADA");

    let resp = ctx
        .admin(ctx.client.delete(ctx.url(&format!("/api/landings/{id}"))))
        .send()
        .await
        .expect("Failed to delete landing");
    let deleted: Value = resp.json().await.expect("Delete body is not JSON");
    assert_eq!(deleted["success"], true);

    let resp = ctx
        .client
        .get(ctx.url(&format!("/api/landings/{slug}")))
        .send()
        .await
        .expect("Failed to read landing");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
