//! Checkout, cancellation and the order lifecycle.

use mercado_integration_tests::{TestClient, create_product, stock_of};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_checkout_then_cancel_restores_stock() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let product_id = create_product(&admin, "100.00", 5).await;

    let customer = TestClient::new();
    customer.register("Eva").await;
    let address_id = customer.create_address().await;

    let (status, cart) = customer
        .post("/api/cart/items", json!({ "product_id": product_id, "quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["subtotal"], "200.00");

    let (status, order) = customer
        .post("/api/orders", json!({ "address_id": address_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal"], "200.00");
    assert_eq!(order["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(stock_of(&customer, product_id).await, 3);

    let (_, cart) = customer.get("/api/cart").await;
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(0));

    let order_id = order["id"].as_i64().unwrap_or_default();
    let (status, cancelled) = customer
        .post(&format!("/api/orders/{order_id}/cancel"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(stock_of(&customer, product_id).await, 5);

    // Cancelled is terminal
    let (status, _) = customer
        .post(&format!("/api/orders/{order_id}/cancel"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_checkout_rejects_more_than_stock() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let product_id = create_product(&admin, "10.00", 1).await;

    let customer = TestClient::new();
    customer.register("Fabio").await;
    let (status, _) = customer
        .post("/api/cart/items", json!({ "product_id": product_id, "quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_delivery_awards_points_and_tracks_shipment() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let product_id = create_product(&admin, "250.00", 10).await;

    let customer = TestClient::new();
    customer.register("Gabi").await;
    let address_id = customer.create_address().await;
    customer
        .post("/api/cart/items", json!({ "product_id": product_id, "quantity": 1 }))
        .await;
    let (_, order) = customer
        .post("/api/orders", json!({ "address_id": address_id }))
        .await;
    let order_id = order["id"].as_i64().unwrap_or_default();

    // Skipping a step is rejected
    let (status, _) = admin
        .patch(&format!("/api/orders/{order_id}/status"), json!({ "status": "shipped" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for status in ["paid", "processing"] {
        let (code, body) = admin
            .patch(&format!("/api/orders/{order_id}/status"), json!({ "status": status }))
            .await;
        assert_eq!(code, StatusCode::OK, "{status}: {body}");
    }
    let tracking_code = format!("BR{}", uuid::Uuid::new_v4().simple()).to_uppercase();
    let (code, shipped) = admin
        .patch(
            &format!("/api/orders/{order_id}/status"),
            json!({ "status": "shipped", "tracking_code": tracking_code, "carrier": "Correios" }),
        )
        .await;
    assert_eq!(code, StatusCode::OK, "{shipped}");
    assert_eq!(shipped["tracking_code"], tracking_code.as_str());

    let (code, tracking) = customer.get(&format!("/api/tracking/code/{tracking_code}")).await;
    assert_eq!(code, StatusCode::OK, "{tracking}");
    assert_eq!(tracking["order_status"], "shipped");

    let (code, _) = admin
        .patch(&format!("/api/orders/{order_id}/status"), json!({ "status": "delivered" }))
        .await;
    assert_eq!(code, StatusCode::OK);

    let (_, loyalty) = customer.get("/api/loyalty").await;
    assert!(loyalty["balance"].as_i64().unwrap_or_default() > 0, "{loyalty}");

    // Delivered orders can no longer be cancelled by the customer
    let (status, _) = customer
        .post(&format!("/api/orders/{order_id}/cancel"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_percentage_coupon_preview() {
    let admin = TestClient::new();
    admin.register_admin().await;
    let code = format!("TESTE{}", &uuid::Uuid::new_v4().simple().to_string()[..6]).to_uppercase();
    let (status, coupon) = admin
        .post(
            "/api/coupons",
            json!({ "code": code, "kind": "percentage", "value": "10" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{coupon}");

    let customer = TestClient::new();
    customer.register("Hugo").await;
    let (status, preview) = customer
        .post(
            "/api/coupons/validate",
            json!({ "code": code.to_lowercase(), "subtotal": "150.00" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{preview}");
    assert_eq!(preview["discount"], "15.00");
    assert_eq!(preview["total_after_discount"], "135.00");
}
