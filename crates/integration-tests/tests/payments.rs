//! Signed gateway notifications.

use hmac::{Hmac, Mac};
use mercado_integration_tests::{TestClient, create_product, database, place_order};
use reqwest::StatusCode;
use serde_json::json;
use sha2::Sha256;
use sqlx::PgPool;

const NOTIFICATIONS: &str = "/api/payments/notifications";

fn sign(body: &[u8]) -> String {
    dotenvy::dotenv().ok();
    let secret = std::env::var("PAYMENT_WEBHOOK_SECRET")
        .expect("PAYMENT_WEBHOOK_SECRET must match the server's");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

async fn notify(client: &TestClient, reference: &str, status: &str, amount: &str) -> StatusCode {
    let body = json!({ "reference": reference, "status": status, "amount": amount }).to_string();
    reqwest::Client::new()
        .post(client.url(NOTIFICATIONS))
        .header("content-type", "application/json")
        .header("x-signature", sign(body.as_bytes()))
        .body(body)
        .send()
        .await
        .expect("send notification")
        .status()
}

async fn insert_payment(pool: &PgPool, order_id: i64, amount: &str) -> String {
    let reference = format!("test-{}", uuid::Uuid::new_v4().simple());
    sqlx::query(
        "INSERT INTO payments (order_id, provider_reference, amount) VALUES ($1, $2, $3::numeric)",
    )
    .bind(i32::try_from(order_id).expect("order id fits in i32"))
    .bind(&reference)
    .bind(amount)
    .execute(pool)
    .await
    .expect("insert payment");
    reference
}

async fn payment_row(pool: &PgPool, reference: &str) -> (String, String) {
    sqlx::query_as(
        "SELECT status::text, updated_at::text FROM payments WHERE provider_reference = $1",
    )
    .bind(reference)
    .fetch_one(pool)
    .await
    .expect("payment row")
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_repeated_notification_is_ignored() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let product_id = create_product(&admin, "90.00", 5).await;

    let customer = TestClient::new();
    customer.register("Joana").await;
    let order = place_order(&customer, product_id, 1).await;
    let order_id = order["id"].as_i64().expect("order id");
    let total = order["total"].as_str().expect("order total").to_string();

    let pool = database().await;
    let reference = insert_payment(&pool, order_id, &total).await;

    assert_eq!(notify(&customer, &reference, "paid", &total).await, StatusCode::NO_CONTENT);
    let (status, first_update) = payment_row(&pool, &reference).await;
    assert_eq!(status, "paid");

    let (_, paid) = customer.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(paid["payment_status"], "paid", "{paid}");
    assert_eq!(paid["status"], "paid", "{paid}");

    assert_eq!(notify(&customer, &reference, "paid", &total).await, StatusCode::NO_CONTENT);
    let (status, second_update) = payment_row(&pool, &reference).await;
    assert_eq!(status, "paid");
    assert_eq!(first_update, second_update);
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_later_failed_payment_leaves_paid_order_settled() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let product_id = create_product(&admin, "60.00", 5).await;

    let customer = TestClient::new();
    customer.register("Lara").await;
    let order = place_order(&customer, product_id, 1).await;
    let order_id = order["id"].as_i64().expect("order id");
    let total = order["total"].as_str().expect("order total").to_string();

    let pool = database().await;
    let first = insert_payment(&pool, order_id, &total).await;
    let second = insert_payment(&pool, order_id, &total).await;

    assert_eq!(notify(&customer, &first, "paid", &total).await, StatusCode::NO_CONTENT);
    assert_eq!(notify(&customer, &second, "cancelled", &total).await, StatusCode::NO_CONTENT);

    let (status, _) = payment_row(&pool, &second).await;
    assert_eq!(status, "failed");
    let (_, current) = customer.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(current["payment_status"], "paid", "{current}");
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_unsigned_notification_is_rejected() {
    let client = TestClient::new();
    let status = reqwest::Client::new()
        .post(client.url(NOTIFICATIONS))
        .header("content-type", "application/json")
        .header("x-signature", "00")
        .body(r#"{"reference":"nope","status":"paid","amount":"1.00"}"#)
        .send()
        .await
        .expect("send notification")
        .status();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
