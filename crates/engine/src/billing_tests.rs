// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_support::{day, Harness};
use sync_core::{AttemptStatus, SubscriptionStatus};
use sync_remote::{ChargeStatus, RemoteError};

#[test]
fn due_cycle_is_charged_once() {
    let h = Harness::new();
    let catalog = h.catalog();
    let contract = h.subscription(&catalog, day(2025, 1, 15));

    let report = h.engine.billing.run_due(day(2025, 1, 15)).unwrap();

    assert_eq!(report.due, 1);
    assert_eq!(report.succeeded, 1);
    let db = h.store();
    let attempts = db.list_billing_attempts(contract.id).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Success);
    assert_eq!(attempts[0].idempotency_key, format!("sub-{}:2025-01-15", contract.id));
    assert!(attempts[0].remote_order_ref.is_some());
    assert_eq!(
        db.get_subscription(contract.id).unwrap().next_billing_at,
        day(2025, 2, 15)
    );
    drop(db);

    let again = h.engine.billing.run_due(day(2025, 1, 15)).unwrap();
    assert_eq!(again.due, 0);
    assert_eq!(h.store().list_billing_attempts(contract.id).unwrap().len(), 1);
    assert_eq!(h.remote.charge_calls().len(), 1);
}

#[test]
fn month_end_contract_returns_to_month_end() {
    let h = Harness::new();
    let catalog = h.catalog();
    let contract = h.subscription(&catalog, day(2025, 1, 31));

    h.engine.billing.run_due(day(2025, 1, 31)).unwrap();
    assert_eq!(
        h.store().get_subscription(contract.id).unwrap().next_billing_at,
        day(2025, 2, 28)
    );

    let report = h.engine.billing.run_due(day(2025, 2, 28)).unwrap();
    assert_eq!(report.succeeded, 1);
    let stored = h.store().get_subscription(contract.id).unwrap();
    assert_eq!(stored.next_billing_at, day(2025, 3, 31));
    assert_eq!(stored.next_delivery_at, day(2025, 4, 2));

    h.engine.billing.run_due(day(2025, 3, 31)).unwrap();
    assert_eq!(
        h.store().get_subscription(contract.id).unwrap().next_billing_at,
        day(2025, 4, 30)
    );
    assert_eq!(h.remote.charge_calls().len(), 3);
}

#[test]
fn nothing_is_due_before_the_billing_date() {
    let h = Harness::new();
    let catalog = h.catalog();
    h.subscription(&catalog, day(2025, 1, 15));

    let report = h.engine.billing.run_due(day(2025, 1, 14)).unwrap();

    assert_eq!(report, BillingReport::default());
    assert!(h.remote.charge_calls().is_empty());
}

#[test]
fn pending_attempt_blocks_a_second_charge() {
    let h = Harness::new();
    let catalog = h.catalog();
    let contract = h.subscription(&catalog, day(2025, 1, 15));
    h.remote.set_charge_outcome(ChargeStatus::Pending, None);

    let first = h.engine.billing.run_due(day(2025, 1, 15)).unwrap();
    let second = h.engine.billing.run_due(day(2025, 1, 15)).unwrap();

    assert_eq!(first.pending, 1);
    assert_eq!(second.already_attempted, 1);
    assert_eq!(h.remote.charge_calls().len(), 1);
    assert_eq!(
        h.store().get_subscription(contract.id).unwrap().next_billing_at,
        day(2025, 1, 15)
    );
}

#[test]
fn failed_cycle_is_retried_on_the_next_run() {
    let h = Harness::new();
    let catalog = h.catalog();
    let contract = h.subscription(&catalog, day(2025, 1, 15));
    h.remote
        .fail_next_n(4, RemoteError::Transient("timeout".into()));

    let failed = h.engine.billing.run_due(day(2025, 1, 15)).unwrap();
    assert_eq!(failed.failed, 1);

    let retried = h.engine.billing.run_due(day(2025, 1, 15)).unwrap();
    assert_eq!(retried.succeeded, 1);
    let attempts = h.store().list_billing_attempts(contract.id).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].idempotency_key, attempts[1].idempotency_key);
}

#[test]
fn contract_without_remote_id_is_not_charged() {
    let h = Harness::new();
    let catalog = h.catalog();
    h.remote
        .fail_next_n(4, RemoteError::Transient("503".into()));
    let contract = h
        .engine
        .lifecycle
        .create_subscription(&h.new_subscription(&catalog, day(2025, 1, 15)))
        .unwrap();
    h.store()
        .set_subscription_status(contract.id, SubscriptionStatus::Active, h.now())
        .unwrap();

    let report = h.engine.billing.run_due(day(2025, 1, 15)).unwrap();

    assert_eq!(report.not_synced, 1);
    assert!(h.remote.charge_calls().is_empty());
    assert!(h.store().list_billing_attempts(contract.id).unwrap().is_empty());
}

#[test]
fn concurrent_run_is_refused() {
    let h = Harness::new();
    let _running = h.engine.billing.run_lock.lock();

    let result = h.engine.billing.run_due(day(2025, 1, 15));

    assert!(matches!(result, Err(EngineError::BillingBusy)));
}

#[test]
fn billing_lock_file_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();

    let held = acquire_billing_lock(dir.path()).unwrap();
    assert!(dir.path().join(BILLING_LOCK_NAME).exists());
    assert!(matches!(
        acquire_billing_lock(dir.path()),
        Err(EngineError::BillingBusy)
    ));

    drop(held);
    assert!(acquire_billing_lock(dir.path()).is_ok());
}
