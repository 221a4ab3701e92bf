//! API integration tests
//!
//! Run against a live server with a staff account configured in `[admin]`:
//! `cargo test -- --ignored`

use reqwest::{multipart, Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn admin_credentials() -> (String, String) {
    (
        std::env::var("FFLO_TEST_ADMIN_EMAIL").unwrap_or_else(|_| "admin@fflo.ca".to_string()),
        std::env::var("FFLO_TEST_ADMIN_PASSWORD").unwrap_or_else(|_| "admin-password".to_string()),
    )
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

async fn login(client: &Client, email: &str, password: &str) -> String {
    let mut attempts = 0;
    let response = loop {
        let response = client
            .post(format!("{}/accounts/login", BASE_URL))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to send login request");
        // login is rate limited and the tests run in parallel
        if response.status() != StatusCode::TOO_MANY_REQUESTS || attempts == 20 {
            break response;
        }
        attempts += 1;
        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    };
    assert!(response.status().is_success(), "login failed for {}", email);

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn staff_token(client: &Client) -> String {
    let (email, password) = admin_credentials();
    login(client, &email, &password).await
}

/// Register a reader and return (email, token, user id)
async fn register_reader(client: &Client) -> (String, String, i64) {
    let email = format!("{}@example.com", unique("reader"));
    let response = client
        .post(format!("{}/accounts/register", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "correct-horse",
            "password2": "correct-horse",
            "first_name": "Reader"
        }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse user");
    let id = body["id"].as_i64().expect("No id in response");
    let token = login(client, &email, "correct-horse").await;
    (email, token, id)
}

/// Register a reader with an active membership
async fn member(client: &Client, staff: &str) -> (String, String, i64) {
    let (email, token, id) = register_reader(client).await;
    let response = client
        .post(format!("{}/accounts/membership", BASE_URL))
        .bearer_auth(staff)
        .json(&json!({ "user_id": id }))
        .send()
        .await
        .expect("Failed to create membership");
    assert_eq!(response.status(), StatusCode::CREATED);
    (email, token, id)
}

async fn create_book(client: &Client, staff: &str, inventory: i32) -> i64 {
    let form = multipart::Form::new()
        .text("title", unique("Book"))
        .text("author", "Test Author")
        .text("inventory", inventory.to_string())
        .text("rental_price", "5.00");

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(staff)
        .multipart(form)
        .send()
        .await
        .expect("Failed to create book");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse book");
    body["id"].as_i64().expect("No id in response")
}

async fn available(client: &Client, book_id: i64) -> i64 {
    let body: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to get book")
        .json()
        .await
        .expect("Failed to parse book");
    body["available"].as_i64().expect("No available count")
}

async fn post_ledger(client: &Client, token: &str, book_id: i64, action: &str) -> reqwest::Response {
    client
        .post(format!("{}/books/{}/{}", BASE_URL, book_id, action))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send ledger request")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();
    let (email, _) = admin_credentials();

    let response = client
        .post(format!("{}/accounts/login", BASE_URL))
        .json(&json!({ "email": email, "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_register_rejects_mismatched_passwords() {
    let client = Client::new();

    let response = client
        .post(format!("{}/accounts/register", BASE_URL))
        .json(&json!({
            "email": format!("{}@example.com", unique("mismatch")),
            "password": "correct-horse",
            "password2": "battery-staple",
            "first_name": "Reader"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_me_and_logout() {
    let client = Client::new();
    let (email, token, _) = register_reader(&client).await;

    let response = client
        .get(format!("{}/accounts/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["email"], email.as_str());
    assert!(body["checked_out"].is_array());

    let response = client
        .post(format!("{}/accounts/logout", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/accounts/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_reader_cannot_create_books() {
    let client = Client::new();
    let (_, token, _) = register_reader(&client).await;

    let form = multipart::Form::new()
        .text("title", unique("Forbidden"))
        .text("author", "Nobody");
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_single_copy_lifecycle() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 1).await;
    let (_, reader_a, _) = member(&client, &staff).await;
    let (_, reader_b, _) = member(&client, &staff).await;

    assert_eq!(available(&client, book_id).await, 1);

    let response = post_ledger(&client, &reader_a, book_id, "reserve").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(available(&client, book_id).await, 0);

    let response = post_ledger(&client, &reader_b, book_id, "reserve").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("Failed to parse error");
    assert_eq!(body["detail"], "No available copies");

    let response = post_ledger(&client, &reader_a, book_id, "return").await;
    assert!(response.status().is_success());
    assert_eq!(available(&client, book_id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_activate_then_return_by_staff() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 2).await;
    let (email, reader, _) = member(&client, &staff).await;

    let response = post_ledger(&client, &reader, book_id, "reserve").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .post(format!("{}/books/{}/activate", BASE_URL, book_id))
        .bearer_auth(&staff)
        .json(&json!({ "email": email }))
        .send()
        .await
        .expect("Failed to activate");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["rental"]["is_active"], true);
    assert_eq!(body["available"], 1);

    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, book_id))
        .bearer_auth(&staff)
        .json(&json!({ "email": email }))
        .send()
        .await
        .expect("Failed to return");
    assert!(response.status().is_success());
    assert_eq!(available(&client, book_id).await, 2);

    // nothing left to return
    let response = post_ledger(&client, &reader, book_id, "return").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(available(&client, book_id).await, 2);
}

#[tokio::test]
#[ignore]
async fn test_second_hold_rejected() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 2).await;

    let response = post_ledger(&client, &staff, book_id, "hold").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(available(&client, book_id).await, 1);

    let response = post_ledger(&client, &staff, book_id, "hold").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(available(&client, book_id).await, 1);

    let response = client
        .delete(format!("{}/books/{}/hold", BASE_URL, book_id))
        .bearer_auth(&staff)
        .send()
        .await
        .expect("Failed to remove hold");
    assert!(response.status().is_success());
    assert_eq!(available(&client, book_id).await, 2);
}

#[tokio::test]
#[ignore]
async fn test_quota_exhausted() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 1).await;
    let (_, reader, _) = member(&client, &staff).await;

    for _ in 0..4 {
        let response = post_ledger(&client, &reader, book_id, "reserve").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = post_ledger(&client, &reader, book_id, "return").await;
        assert!(response.status().is_success());
    }

    let response = post_ledger(&client, &reader, book_id, "reserve").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(available(&client, book_id).await, 1);

    let body: Value = client
        .get(format!("{}/accounts/membership", BASE_URL))
        .bearer_auth(&reader)
        .send()
        .await
        .expect("Failed to get membership")
        .json()
        .await
        .expect("Failed to parse membership");
    assert_eq!(body["monthly_books"], 4);
    assert_eq!(body["remaining_books"], 0);
}

#[tokio::test]
#[ignore]
async fn test_reserve_without_membership() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 1).await;
    let (_, reader, _) = register_reader(&client).await;

    let response = post_ledger(&client, &reader, book_id, "reserve").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(available(&client, book_id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_cancel_twice() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 1).await;
    let (_, reader, _) = member(&client, &staff).await;

    let response = post_ledger(&client, &reader, book_id, "reserve").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["monthly_books"], 1);

    let cancel = || {
        client
            .delete(format!("{}/books/{}/reserve", BASE_URL, book_id))
            .bearer_auth(&reader)
            .send()
    };

    let response = cancel().await.expect("Failed to cancel");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["monthly_books"], 0);
    assert_eq!(body["available"], 1);

    let response = cancel().await.expect("Failed to cancel");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_rating_average() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 1).await;
    let (_, reader, _) = register_reader(&client).await;

    let rate = |token: String, rating: i32| {
        client
            .post(format!("{}/books/{}/rating", BASE_URL, book_id))
            .bearer_auth(token)
            .json(&json!({ "rating": rating }))
            .send()
    };

    let response = rate(staff.clone(), 2).await.expect("Failed to rate");
    assert!(response.status().is_success());
    let response = rate(reader.clone(), 5).await.expect("Failed to rate");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["average"], 3.5);

    let response = rate(reader.clone(), 0).await.expect("Failed to rate");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["rating"].is_null());
    assert_eq!(body["average"], 2.0);

    let response = rate(reader, 6).await.expect("Failed to rate");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_category_ordering() {
    let client = Client::new();
    let staff = staff_token(&client).await;

    let mut created = Vec::new();
    for _ in 0..2 {
        let response = client
            .post(format!("{}/categories", BASE_URL))
            .bearer_auth(&staff)
            .json(&json!({ "name": unique("cat") }))
            .send()
            .await
            .expect("Failed to create category");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = response.json().await.expect("Failed to parse category");
        created.push(body["id"].as_i64().expect("No id"));
    }

    let categories: Vec<Value> = client
        .get(format!("{}/categories", BASE_URL))
        .send()
        .await
        .expect("Failed to list categories")
        .json()
        .await
        .expect("Failed to parse categories");
    let mut ids: Vec<i64> = categories.iter().filter_map(|c| c["id"].as_i64()).collect();
    ids.reverse();

    let response = client
        .put(format!("{}/categories/reorder", BASE_URL))
        .bearer_auth(&staff)
        .json(&json!({ "ids": ids }))
        .send()
        .await
        .expect("Failed to reorder");
    assert!(response.status().is_success());
    let reordered: Vec<Value> = response.json().await.expect("Failed to parse categories");
    for (position, category) in reordered.iter().enumerate() {
        assert_eq!(category["sort_order"].as_i64(), Some(position as i64));
        assert_eq!(category["id"].as_i64(), Some(ids[position]));
    }

    // an incomplete ordering is refused
    let response = client
        .put(format!("{}/categories/reorder", BASE_URL))
        .bearer_auth(&staff)
        .json(&json!({ "ids": [created[0]] }))
        .send()
        .await
        .expect("Failed to reorder");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_webhook_rejects_bad_signature() {
    let client = Client::new();

    let response = client
        .post(format!("{}/payments/webhook", BASE_URL))
        .header("Stripe-Signature", "t=1,v1=00")
        .body(r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_x"}}}"#)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_free_checkout() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 1).await;
    let (_, reader, _) = member(&client, &staff).await;
    let cart = json!([{ "type": "rental", "book_id": book_id }]);

    let response = client
        .post(format!("{}/payments/checkout", BASE_URL))
        .bearer_auth(&reader)
        .json(&json!({ "cart_items": cart }))
        .send()
        .await
        .expect("Failed to quote");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse quote");
    assert_eq!(body["free_books_used"], 1);
    assert_eq!(body["rental_details"][0]["free"], true);

    let response = client
        .post(format!("{}/payments/checkout/finalize", BASE_URL))
        .bearer_auth(&reader)
        .json(&json!({ "cart_items": cart }))
        .send()
        .await
        .expect("Failed to finalize");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(available(&client, book_id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_paid_checkout_requires_settled_payment() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let book_id = create_book(&client, &staff, 1).await;
    // no membership, so the rental is charged
    let (_, reader, _) = register_reader(&client).await;
    let cart = json!([{ "type": "rental", "book_id": book_id }]);

    let response = client
        .post(format!("{}/payments/checkout", BASE_URL))
        .bearer_auth(&reader)
        .json(&json!({ "cart_items": cart }))
        .send()
        .await
        .expect("Failed to quote");
    let body: Value = response.json().await.expect("Failed to parse quote");
    assert_eq!(body["free_books_used"], 0);
    assert_eq!(body["rental_details"][0]["free"], false);

    for request in [
        json!({ "cart_items": cart }),
        json!({ "cart_items": cart, "payment_successful": false, "stripe_payment_id": "pi_unpaid" }),
        json!({ "cart_items": cart, "payment_successful": true, "stripe_payment_id": unique("pi") }),
    ] {
        let response = client
            .post(format!("{}/payments/checkout/finalize", BASE_URL))
            .bearer_auth(&reader)
            .json(&request)
            .send()
            .await
            .expect("Failed to finalize");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(available(&client, book_id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_negative_rental_price_rejected() {
    let client = Client::new();
    let staff = staff_token(&client).await;
    let form = multipart::Form::new()
        .text("title", unique("Book"))
        .text("author", "Test Author")
        .text("inventory", "1")
        .text("rental_price", "-5.00");

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&staff)
        .multipart(form)
        .send()
        .await
        .expect("Failed to create book");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
