//! Support tickets.

use mercado_integration_tests::TestClient;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_closed_ticket_rejects_replies() {
    let customer = TestClient::new();
    customer.register("Marta").await;

    let (status, ticket) = customer
        .post(
            "/api/support/tickets",
            json!({ "subject": "Wrong size", "message": "I got an M instead of a G." }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{ticket}");
    let ticket_id = ticket["id"].as_i64().unwrap_or_default();
    let messages = format!("/api/support/tickets/{ticket_id}/messages");

    let (status, body) = customer.post(&messages, json!({ "body": "Any news?" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, closed) = customer
        .patch(
            &format!("/api/support/tickets/{ticket_id}/status"),
            json!({ "status": "closed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{closed}");
    assert_eq!(closed["status"], "closed");

    let (status, body) = customer.post(&messages, json!({ "body": "Hello?" })).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (_, detail) = customer.get(&format!("/api/support/tickets/{ticket_id}")).await;
    assert_eq!(detail["messages"].as_array().map(Vec::len), Some(2), "{detail}");
}

#[tokio::test]
#[ignore = "requires a running server and database access"]
async fn test_customer_cannot_reopen_ticket() {
    let customer = TestClient::new();
    customer.register("Nina").await;

    let (_, ticket) = customer
        .post(
            "/api/support/tickets",
            json!({ "subject": "Invoice", "message": "Please send the invoice." }),
        )
        .await;
    let ticket_id = ticket["id"].as_i64().unwrap_or_default();

    let (status, body) = customer
        .patch(
            &format!("/api/support/tickets/{ticket_id}/status"),
            json!({ "status": "answered" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}
