// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::NaiveDate;
use mockito::Matcher;
use serde_json::json;

fn remote(server: &mockito::Server) -> HttpRemote {
    HttpRemote::new(HttpRemoteConfig {
        base_url: server.url(),
        access_token: "secret-token".into(),
        timeout: Duration::from_secs(5),
        max_rate_limit_retries: 2,
        max_retry_after: Duration::from_secs(1),
    })
    .unwrap()
}

#[test]
fn create_sends_idempotency_key_and_token() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/customers")
        .match_header("idempotency-key", "create-customer-1")
        .match_header("authorization", "Bearer secret-token")
        .match_body(Matcher::Json(json!({"email": "ada@example.com"})))
        .with_status(201)
        .with_body(r#"{"id": "gid://shop/Customer/123", "email": "ada@example.com"}"#)
        .create();

    let record = remote(&server)
        .create(
            EntityKind::Customer,
            &json!({"email": "ada@example.com"}),
            "create-customer-1",
        )
        .unwrap();

    mock.assert();
    assert_eq!(record.id, "gid://shop/Customer/123");
}

#[test]
fn validation_error_is_decoded() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/products")
        .with_status(422)
        .with_body(r#"{"errors": {"title": ["can't be blank"]}}"#)
        .create();

    let err = remote(&server)
        .create(EntityKind::Product, &json!({}), "k")
        .unwrap_err();

    assert_eq!(err, RemoteError::Validation("title can't be blank".into()));
    assert!(!err.is_retryable());
}

#[test]
fn server_error_is_transient() {
    let mut server = mockito::Server::new();
    server.mock("PUT", "/products/123").with_status(503).create();

    let err = remote(&server)
        .update(EntityKind::Product, "123", &json!({"title": "Tea"}), "k")
        .unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}

#[test]
fn missing_record_on_update_is_conflict() {
    let mut server = mockito::Server::new();
    server
        .mock("PUT", "/products/123")
        .with_status(404)
        .with_body(r#"{"errors": "Not Found"}"#)
        .create();

    let err = remote(&server)
        .update(EntityKind::Product, "123", &json!({}), "k")
        .unwrap_err();
    assert_eq!(err, RemoteError::Conflict("Not Found".into()));
}

#[test]
fn rate_limit_is_retried_then_reported() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/customers")
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(3)
        .create();

    let err = remote(&server)
        .create(EntityKind::Customer, &json!({}), "k")
        .unwrap_err();

    mock.assert();
    assert_eq!(err, RemoteError::RateLimited { retry_after: Some(0) });
}

#[test]
fn unreadable_success_body_is_transient() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/customers")
        .with_status(200)
        .with_body("not json")
        .create();

    let err = remote(&server)
        .create(EntityKind::Customer, &json!({}), "k")
        .unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}

#[test]
fn find_by_code_returns_first_match() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/product_variants")
        .match_query(Matcher::UrlEncoded("code".into(), "TEA-100G".into()))
        .with_status(200)
        .with_body(r#"[{"id": "gid://shop/ProductVariant/9", "sku": "TEA-100G"}]"#)
        .create();
    server
        .mock("GET", "/customers")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create();

    let client = remote(&server);
    let found = client
        .find_by_code(EntityKind::ProductVariant, "TEA-100G")
        .unwrap();
    assert_eq!(found.unwrap().id, "gid://shop/ProductVariant/9");
    assert!(client
        .find_by_code(EntityKind::Customer, "nobody@example.com")
        .unwrap()
        .is_none());
}

#[test]
fn billing_attempt_posts_to_contract() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/subscription_contracts/55/billing_attempts")
        .match_header("idempotency-key", "sub-1:2025-01-15")
        .match_body(Matcher::PartialJson(json!({"cycle_date": "2025-01-15"})))
        .with_status(201)
        .with_body(r#"{"id": "ba_1", "status": "success", "order_id": "order_77"}"#)
        .create();

    let result = remote(&server)
        .create_billing_attempt(
            "55",
            &BillingAttemptRequest {
                idempotency_key: "sub-1:2025-01-15".into(),
                cycle_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            },
        )
        .unwrap();

    mock.assert();
    assert_eq!(result.order_id.as_deref(), Some("order_77"));
}

#[test]
fn cancel_contract_posts_cancel() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/subscription_contracts/55/cancel")
        .match_header("idempotency-key", "cancel-1")
        .with_status(200)
        .with_body(r#"{"id": "55", "status": "cancelled"}"#)
        .create();

    let record = remote(&server).cancel_contract("55", "cancel-1").unwrap();
    mock.assert();
    assert_eq!(record.fields["status"], json!("cancelled"));
}

#[test]
fn invalid_base_url_is_rejected() {
    let result = HttpRemote::new(HttpRemoteConfig {
        base_url: "not a url".into(),
        ..HttpRemoteConfig::default()
    });
    assert!(result.is_err());
}
