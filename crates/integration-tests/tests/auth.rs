//! Account and session flows.

use mercado_integration_tests::{TEST_PASSWORD, TestClient};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "requires a running server"]
async fn test_health() {
    let client = TestClient::new();
    assert_eq!(client.get("/health").await.0, StatusCode::OK);
    assert_eq!(client.get("/health/ready").await.0, StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn test_register_login_logout() {
    let client = TestClient::new();
    let email = client.register("Bruna").await;

    let (status, me) = client.get("/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], email.as_str());
    assert_eq!(me["role"], "customer");
    assert_eq!(me["loyalty"]["tier"], "bronze");
    assert_eq!(me["loyalty"]["balance"], 0);

    assert_eq!(
        client.post("/api/auth/logout", json!({})).await.0,
        StatusCode::NO_CONTENT
    );
    assert_eq!(client.get("/api/auth/me").await.0, StatusCode::UNAUTHORIZED);

    assert_eq!(client.login(&email).await, StatusCode::OK);
    assert_eq!(client.get("/api/auth/me").await.0, StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn test_duplicate_email_and_bad_password() {
    let client = TestClient::new();
    let email = client.register("Caio").await;

    let other = TestClient::new();
    let (status, _) = other
        .post(
            "/api/auth/register",
            json!({ "email": email.to_uppercase(), "password": TEST_PASSWORD, "name": "Caio" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = other
        .post(
            "/api/auth/login",
            json!({ "email": email, "password": "not-the-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["statusCode"], 401);
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn test_customer_cannot_use_admin_routes() {
    let client = TestClient::new();
    client.register("Dora").await;

    assert_eq!(client.get("/api/admin/dashboard").await.0, StatusCode::FORBIDDEN);
    let (status, _) = client
        .post("/api/products", json!({ "name": "X", "price": "1.00" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
