// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::subscription::SubscriptionStatus;

#[test]
fn migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    run_migrations(&db.conn).unwrap();
    run_migrations(&db.conn).unwrap();
}

#[test]
fn contracts_without_anchors_are_anchored_on_their_dates() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE subscriptions (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             customer_id INTEGER NOT NULL,
             selling_plan_id INTEGER NOT NULL,
             status TEXT NOT NULL,
             next_billing_at TEXT NOT NULL,
             next_delivery_at TEXT NOT NULL,
             billing_interval TEXT NOT NULL,
             delivery_address_id INTEGER NOT NULL,
             payment_method_ref TEXT,
             field_times TEXT NOT NULL DEFAULT '{}',
             created_at TEXT NOT NULL,
             updated_at TEXT NOT NULL
         );
         INSERT INTO subscriptions (customer_id, selling_plan_id, status, next_billing_at,
             next_delivery_at, billing_interval, delivery_address_id, created_at, updated_at)
         VALUES (1, 1, 'active', '2025-03-31T00:00:00+00:00', '2025-04-02T00:00:00+00:00',
             '1month', 1, '2025-01-01T00:00:00+00:00', '2025-01-01T00:00:00+00:00');",
    )
    .unwrap();

    run_migrations(&conn).unwrap();
    let db = Database { conn };
    let contract = db.get_subscription(1).unwrap();

    assert_eq!(contract.billing_anchor_at, contract.next_billing_at);
    assert_eq!(contract.delivery_anchor_at, contract.next_delivery_at);
}

#[test]
fn open_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state").join("store.db");

    let db = Database::open(&path).unwrap();
    drop(db);

    assert!(path.exists());
    // Re-open runs migrations against the existing file
    Database::open(&path).unwrap();
}

#[test]
fn parse_db_reports_column() {
    let err = parse_db::<SubscriptionStatus>("bogus", "status").unwrap_err();
    assert!(err.to_string().contains("status"));
}

#[test]
fn parse_timestamp_rejects_garbage() {
    assert!(parse_timestamp("yesterday", "created_at").is_err());
    assert!(parse_timestamp("2025-01-15T00:00:00+00:00", "created_at").is_ok());
    assert!(parse_timestamp_opt(None, "x").unwrap().is_none());
}

#[test]
fn parse_json_rejects_garbage() {
    assert!(parse_json::<Vec<String>>("[not json", "dirty_fields").is_err());
    assert_eq!(
        parse_json::<Vec<String>>("[\"a\"]", "dirty_fields").unwrap(),
        vec!["a".to_string()]
    );
}
