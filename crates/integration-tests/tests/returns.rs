//! Return lifecycle: delivered order, return request, approval, completion.

use mercado_integration_tests::{TestClient, create_product, deliver, place_order, stock_of};
use reqwest::StatusCode;
use serde_json::{Value, json};

async fn loyalty_balance(client: &TestClient) -> i64 {
    let (status, loyalty) = client.get("/api/loyalty").await;
    assert_eq!(status, StatusCode::OK, "{loyalty}");
    loyalty["balance"].as_i64().unwrap_or_default()
}

async fn return_and_complete(
    customer: &TestClient,
    admin: &TestClient,
    order_id: i64,
    order_item_id: i64,
) -> Value {
    let (status, created) = customer
        .post(
            "/api/returns",
            json!({
                "order_id": order_id,
                "kind": "refund",
                "reason": "Arrived scratched",
                "items": [{ "order_item_id": order_item_id, "quantity": 1 }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "pending");
    let return_id = created["id"].as_i64().unwrap_or_default();

    let (status, approved) = admin
        .post(&format!("/api/returns/{return_id}/approve"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["status"], "approved");

    let (status, completed) = admin
        .post(&format!("/api/returns/{return_id}/complete"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{completed}");
    assert_eq!(completed["status"], "completed");
    completed
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_completed_returns_restock_refund_and_revert_points() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let product_id = create_product(&admin, "250.00", 10).await;

    let customer = TestClient::new();
    customer.register("Helena").await;
    let order = place_order(&customer, product_id, 2).await;
    let order_id = order["id"].as_i64().unwrap_or_default();
    let order_item_id = order["items"][0]["id"].as_i64().unwrap_or_default();
    assert_eq!(stock_of(&customer, product_id).await, 8);

    deliver(&admin, order_id).await;
    let earned = loyalty_balance(&customer).await;
    assert!(earned > 0, "delivery should award points");

    let first = return_and_complete(&customer, &admin, order_id, order_item_id).await;
    assert_eq!(first["refund_amount"], "250.00");
    let reverted = first["points_reverted"].as_i64().unwrap_or_default();
    assert_eq!(reverted, earned / 2);
    assert_eq!(loyalty_balance(&customer).await, earned - reverted);
    assert_eq!(stock_of(&customer, product_id).await, 9);

    let (_, partial) = customer.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(partial["status"], "partially_refunded", "{partial}");

    let second = return_and_complete(&customer, &admin, order_id, order_item_id).await;
    assert_eq!(second["refund_amount"], "250.00");
    assert_eq!(loyalty_balance(&customer).await, 0);
    assert_eq!(stock_of(&customer, product_id).await, 10);

    let (_, refunded) = customer.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(refunded["status"], "refunded", "{refunded}");
    assert_eq!(refunded["payment_status"], "refunded", "{refunded}");
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_undelivered_order_cannot_be_returned() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let product_id = create_product(&admin, "40.00", 5).await;

    let customer = TestClient::new();
    customer.register("Iris").await;
    let order = place_order(&customer, product_id, 1).await;

    let (status, body) = customer
        .post(
            "/api/returns",
            json!({
                "order_id": order["id"],
                "kind": "refund",
                "reason": "Changed my mind",
                "items": [{ "order_item_id": order["items"][0]["id"], "quantity": 1 }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}
