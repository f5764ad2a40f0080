//! Server-rendered pages.

use mercado_integration_tests::{TEST_PASSWORD, TestClient};
use reqwest::StatusCode;

#[tokio::test]
#[ignore = "requires a running server"]
async fn test_public_pages_render() {
    let client = TestClient::new();
    for path in ["/store", "/store/products", "/store/login", "/store/register"] {
        let (status, _) = client.get(path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
    }
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn test_form_login() {
    let email = TestClient::new().register("Iris").await;
    let client = TestClient::new();

    let (status, location) = client
        .post_form("/store/login", &[("email", email.as_str()), ("password", "wrong-password")])
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/store/login?error=credentials"));

    let (status, location) = client.post_form("/store/cart/remove", &[("product_id", "1")]).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/store/login"));

    let (status, location) = client
        .post_form("/store/login", &[("email", email.as_str()), ("password", TEST_PASSWORD)])
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/store"));

    assert_eq!(client.get("/store/cart").await.0, StatusCode::OK);
    assert_eq!(client.get("/store/account/orders").await.0, StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn test_register_form_rejects_mismatched_passwords() {
    let client = TestClient::new();
    let email = mercado_integration_tests::unique_email("jonas");
    let (status, location) = client
        .post_form(
            "/store/register",
            &[
                ("name", "Jonas"),
                ("email", email.as_str()),
                ("password", TEST_PASSWORD),
                ("password_confirm", "something-else"),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/store/register?error=password_mismatch"));
}
