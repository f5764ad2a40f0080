//! HTTP integration tests for Mercado.
//!
//! The tests talk to a running server over HTTP and are `#[ignore]`d so a
//! plain `cargo test` stays hermetic.
//!
//! # Running Tests
//!
//! ```bash
//! mercado migrate
//! cargo run -p mercado-server &
//! cargo test -p mercado-integration-tests -- --ignored --test-threads=1
//! ```
//!
//! # Environment Variables
//!
//! - `MERCADO_TEST_URL` - Server under test (default: `http://127.0.0.1:3000`)
//! - `MERCADO_DATABASE_URL` - Same database as the server; used to promote
//!   test accounts to admin and to seed payment rows
//! - `PAYMENT_WEBHOOK_SECRET` - Same secret as the server; signs webhook
//!   notifications

#![allow(clippy::missing_panics_doc)]

use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Password every test account registers with.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// One browser-like session against the server under test.
pub struct TestClient {
    client: Client,
    base_url: String,
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClient {
    /// A client with its own cookie jar.
    #[must_use]
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("MERCADO_TEST_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        let client = Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and decode the JSON body (`Null` when empty).
    pub async fn send(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("send request");
        let status = response.status();
        let text = response.text().await.expect("read body");
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, value)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, path, Some(body)).await
    }

    /// Submit an HTML form; returns the status and any `Location` header.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> (StatusCode, Option<String>) {
        let response = self
            .client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .expect("send form");
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|l| l.to_str().ok())
            .map(String::from);
        (response.status(), location)
    }

    /// Register a fresh account and stay logged in as it. Returns its email.
    pub async fn register(&self, name: &str) -> String {
        let email = unique_email(name);
        let (status, body) = self
            .post(
                "/api/auth/register",
                json!({ "email": email, "password": TEST_PASSWORD, "name": name }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        email
    }

    pub async fn login(&self, email: &str) -> StatusCode {
        self.post(
            "/api/auth/login",
            json!({ "email": email, "password": TEST_PASSWORD }),
        )
        .await
        .0
    }

    /// Register, promote to admin and log in again so the session has the role.
    pub async fn register_admin(&self) -> String {
        let email = self.register("Admin").await;
        promote(&email).await;
        assert_eq!(self.login(&email).await, StatusCode::OK);
        email
    }

    /// Create an address and return its id.
    pub async fn create_address(&self) -> i64 {
        let (status, body) = self
            .post(
                "/api/addresses",
                json!({
                    "recipient": "Ana Souza",
                    "street": "Rua das Flores",
                    "number": "120",
                    "district": "Centro",
                    "city": "São Paulo",
                    "state": "sp",
                    "postal_code": "01001000",
                    "is_default": true
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "address failed: {body}");
        body["id"].as_i64().expect("address id")
    }
}

/// An email no other test run has used.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!(
        "{}-{}@example.com",
        prefix.to_ascii_lowercase(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Pool on the server's database.
pub async fn database() -> sqlx::PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("MERCADO_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("MERCADO_DATABASE_URL must point at the server's database");
    sqlx::PgPool::connect(&url).await.expect("connect to database")
}

/// Give an account the admin role directly in the database.
pub async fn promote(email: &str) {
    let pool = database().await;
    sqlx::query("UPDATE users SET role = 'admin' WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .execute(&pool)
        .await
        .expect("promote user");
}

/// Put `quantity` of a product in the cart and check out. Returns the order.
pub async fn place_order(customer: &TestClient, product_id: i64, quantity: u32) -> Value {
    let address_id = customer.create_address().await;
    let (status, cart) = customer
        .post("/api/cart/items", json!({ "product_id": product_id, "quantity": quantity }))
        .await;
    assert_eq!(status, StatusCode::OK, "add to cart failed: {cart}");

    let (status, order) = customer
        .post("/api/orders", json!({ "address_id": address_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {order}");
    order
}

/// Walk an order from `pending` to `delivered` as `admin`.
pub async fn deliver(admin: &TestClient, order_id: i64) {
    let path = format!("/api/orders/{order_id}/status");
    for status in ["paid", "processing"] {
        let (code, body) = admin.patch(&path, json!({ "status": status })).await;
        assert_eq!(code, StatusCode::OK, "{status}: {body}");
    }
    let tracking_code = format!("BR{}", uuid::Uuid::new_v4().simple()).to_uppercase();
    let (code, body) = admin
        .patch(
            &path,
            json!({ "status": "shipped", "tracking_code": tracking_code, "carrier": "Correios" }),
        )
        .await;
    assert_eq!(code, StatusCode::OK, "shipped: {body}");
    let (code, body) = admin.patch(&path, json!({ "status": "delivered" })).await;
    assert_eq!(code, StatusCode::OK, "delivered: {body}");
}

/// Current stock of a product.
pub async fn stock_of(client: &TestClient, product_id: i64) -> i64 {
    let (status, product) = client.get(&format!("/api/products/{product_id}")).await;
    assert_eq!(status, StatusCode::OK, "{product}");
    product["stock"].as_i64().expect("stock")
}

/// Create an active product as `admin` and return its id.
pub async fn create_product(admin: &TestClient, price: &str, stock: i32) -> i64 {
    let name = format!("Produto {}", uuid::Uuid::new_v4().simple());
    let (status, body) = admin
        .post(
            "/api/products",
            json!({ "name": name, "description": "Teste", "price": price, "stock": stock }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "product failed: {body}");
    body["id"].as_i64().expect("product id")
}
