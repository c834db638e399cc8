//! Router tests that fail before reaching the database.
//!
//! The pool never connects, so any request that gets past validation would
//! come back as a 500.

#![allow(clippy::unwrap_used)]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use thirtybees_integration_tests::{TEST_TOKEN, offline_state};
use thirtybees_shop::routes;

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = routes::app(offline_state()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn authorized(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_does_not_need_token() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = routes::app(offline_state()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let request = Request::builder()
        .uri("/api/groups")
        .body(Body::empty())
        .unwrap();
    let response = routes::app(offline_state()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_wrong_token_is_rejected() {
    let request = Request::builder()
        .uri("/api/combinations/status")
        .header(header::AUTHORIZATION, "Bearer not-the-right-token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_group_discount_over_100_is_rejected() {
    let body = json!({
        "name": { "1": "Wholesale" },
        "reduction": 150,
    });
    let (status, body) = send(authorized("POST", "/api/groups", &body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_category_reduction_rejects_zero_category() {
    let body = json!({ "category_id": 0, "reduction": 10 });
    let (status, body) = send(authorized(
        "POST",
        "/api/groups/category-reduction?lang=1",
        &body,
    ))
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "wrong category id");
}

#[tokio::test]
async fn test_category_reduction_rejects_negative_discount() {
    let body = json!({ "category_id": 3, "reduction": -5 });
    let (status, _) = send(authorized(
        "POST",
        "/api/groups/category-reduction?lang=1",
        &body,
    ))
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_non_positive_lang_is_bad_request() {
    let request = Request::builder()
        .uri("/api/groups?lang=0")
        .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_guest_cannot_merge_into_itself() {
    let body = json!({ "target_guest_id": 5, "customer_id": 1 });
    let (status, _) = send(authorized("POST", "/api/guests/5/merge", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_guest_merge_needs_positive_target() {
    let body = json!({ "target_guest_id": 0, "customer_id": 1 });
    let (status, _) = send(authorized("POST", "/api/guests/5/merge", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_client_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/combinations")
        .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"product_id\":"))
        .unwrap();
    let (status, _) = send(request).await;

    assert!(status.is_client_error());
}
