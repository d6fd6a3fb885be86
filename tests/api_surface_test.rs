//! HTTP-level tests exercising the router end to end: routing, identity
//! headers, status codes and response shapes.

mod common;

use axum::body::to_bytes;
use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use common::{read_json, TestApp};

#[tokio::test]
async fn health_endpoints_respond() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "up");

    let response = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["database"]["status"], "up");
}

#[tokio::test]
async fn metrics_endpoint_exports_counters() {
    let app = TestApp::new().await;

    // Counters register on first touch; trip one before scraping.
    let _ = app
        .services()
        .checkout
        .checkout(Uuid::new_v4(), app.checkout_request(&[], None))
        .await;

    let response = app.request(Method::GET, "/metrics", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("metrics body");
    let text = String::from_utf8(bytes.to_vec()).expect("metrics body is utf-8");
    assert!(text.contains("checkout_failures_total"));
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/orders", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sellers_manage_listings_over_http() {
    let app = TestApp::new().await;
    let seller = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some((seller, "seller")),
            Some(json!({"name": "Film camera", "price": "120.00", "stock_quantity": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["name"], "Film camera");
    assert_eq!(created["price"], "120.00");
    assert_eq!(created["seller_id"], json!(seller));
    let product_id = created["id"].as_str().expect("listing id").to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{product_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/products?page=1&per_page=10", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing = read_json(response).await;
    assert_eq!(listing["data"].as_array().expect("data array").len(), 1);
    assert_eq!(listing["pagination"]["total"], 1);

    // Plain users cannot list goods.
    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some((Uuid::new_v4(), "user")),
            Some(json!({"name": "Junk", "price": "1.00", "stock_quantity": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // And an empty name never reaches the service.
    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some((seller, "seller")),
            Some(json!({"name": "", "price": "1.00", "stock_quantity": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_owner_may_manage_stock() {
    let app = TestApp::new().await;
    let seller = Uuid::new_v4();
    let speakers = app.seed_product(seller, "Speakers", dec!(40.00), 2).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/products/{}/stock", speakers.id),
            Some((Uuid::new_v4(), "seller")),
            Some(json!({"quantity": 9})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/products/{}/stock", speakers.id),
            Some((seller, "seller")),
            Some(json!({"quantity": 9})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["stock_quantity"], 9);
}

#[tokio::test]
async fn checkout_and_transition_over_http() {
    let app = TestApp::new().await;
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();

    let bike = app.seed_product(seller, "Road bike", dec!(120.00), 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/lines",
            Some((buyer, "user")),
            Some(json!({"product_id": bike.id, "quantity": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let line = read_json(response).await;
    let line_id = line["id"].as_str().expect("cart line id").to_string();

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some((buyer, "user")),
            Some(json!({
                "selected_line_ids": [line_id],
                "receiver_name": "A. Buyer",
                "receiver_phone": "010-0000-0000",
                "shipping_address": "1 Main St, Springfield",
                "payment_method": "Cod"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let outcome = read_json(response).await;
    assert_eq!(outcome["total_amount"], "125.00");
    let order_id = outcome["order_ids"][0].as_str().expect("order id").to_string();
    let group_id = outcome["transaction_group_id"]
        .as_str()
        .expect("group id")
        .to_string();

    let response = app
        .request(Method::GET, "/api/v1/orders", Some((buyer, "user")), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().expect("data array").len(), 1);
    assert_eq!(body["data"][0]["id"].as_str(), Some(order_id.as_str()));

    // The seller sees it on the selling side too.
    let response = app
        .request(
            Method::GET,
            "/api/v1/orders/selling",
            Some((seller, "seller")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().expect("data array").len(), 1);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/transition"),
            Some((seller, "seller")),
            Some(json!({"target": "Shipping"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "Shipping");

    // Cancellation after shipping is a conflict.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/transition"),
            Some((buyer, "user")),
            Some(json!({"target": "Cancelled"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/transaction-groups/{group_id}"),
            Some((buyer, "user")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let group = read_json(response).await;
    assert_eq!(group["orders"].as_array().expect("orders array").len(), 1);

    // A stranger gets nothing.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/transaction-groups/{group_id}"),
            Some((Uuid::new_v4(), "user")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn coupon_check_and_wallet_over_http() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();

    let response = app
        .request(
            Method::GET,
            "/api/v1/coupons/check?code=NOPE&amount=10",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.seed_fixed_coupon("TEN", dec!(10.00), 5).await;
    let response = app
        .request(
            Method::GET,
            "/api/v1/coupons/check?code=TEN&amount=100.00",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let quote = read_json(response).await;
    assert_eq!(quote["eligible"], true);
    assert_eq!(quote["discount"], "10.00");

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/TEN/claim",
            Some((buyer, "user")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::GET,
            "/api/v1/coupons/wallet",
            Some((buyer, "user")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let wallet = read_json(response).await;
    assert_eq!(wallet.as_array().expect("wallet array").len(), 1);
    assert_eq!(wallet[0]["code"], "TEN");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = read_json(response).await;
    assert_eq!(doc["info"]["title"], "Resale API");
    assert!(doc["paths"]["/api/v1/checkout"].is_object());
    assert!(doc["components"]["securitySchemes"]["UserIdHeader"].is_object());
}
