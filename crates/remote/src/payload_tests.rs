// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;

#[test]
fn record_collects_extra_fields() {
    let record: RemoteRecord = serde_json::from_value(json!({
        "id": "gid://shop/Product/1",
        "title": "Tea",
        "updated_at": "2025-01-01T00:00:00Z"
    }))
    .unwrap();

    assert_eq!(record.id, "gid://shop/Product/1");
    assert!(record.updated_at.is_some());
    assert_eq!(record.fields["title"], json!("Tea"));
    assert!(!record.fields.contains_key("id"));
}

#[test]
fn record_without_id_is_rejected() {
    assert!(serde_json::from_value::<RemoteRecord>(json!({"title": "Tea"})).is_err());
}

#[test]
fn billing_request_serializes_iso_date() {
    let req = BillingAttemptRequest {
        idempotency_key: "sub-1:2025-01-15".into(),
        cycle_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
    };
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["cycle_date"], json!("2025-01-15"));
}

#[test]
fn billing_result_statuses() {
    let result: BillingAttemptResult = serde_json::from_value(json!({
        "id": "ba_1",
        "status": "failure",
        "error_message": "card declined"
    }))
    .unwrap();
    assert_eq!(result.status, ChargeStatus::Failure);
    assert_eq!(result.order_id, None);
}
