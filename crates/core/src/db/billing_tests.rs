// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::subscription::{
    billing_idempotency_key, BillingInterval, LineItem, NewSubscription, SubscriptionStatus,
};
use chrono::TimeZone;

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn subscription(db: &Database) -> i64 {
    db.insert_subscription(
        &NewSubscription {
            customer_id: 1,
            selling_plan_id: 1,
            first_billing_at: day(2025, 1, 15),
            first_delivery_at: day(2025, 1, 15),
            interval: BillingInterval::monthly(),
            line_items: vec![LineItem {
                variant_id: 1,
                quantity: 1,
                unit_price_cents: 1000,
            }],
            delivery_address_id: 1,
            payment_method_ref: None,
        },
        SubscriptionStatus::Active,
        day(2025, 1, 1),
    )
    .unwrap()
    .id
}

#[test]
fn second_live_attempt_for_key_is_refused() {
    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    let key = billing_idempotency_key(sub, day(2025, 1, 15));

    let first = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap();
    assert!(first.is_some());

    let second = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap();
    assert!(second.is_none());
    assert_eq!(db.list_billing_attempts(sub).unwrap().len(), 1);
}

#[test]
fn failed_attempt_frees_the_key() {
    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    let key = billing_idempotency_key(sub, day(2025, 1, 15));

    let first = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap()
        .unwrap();
    db.complete_billing_attempt(
        first.id,
        AttemptStatus::Failed,
        None,
        Some("card declined"),
        day(2025, 1, 15),
    )
    .unwrap();

    assert!(db.live_billing_attempt(&key).unwrap().is_none());
    let retry = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 16))
        .unwrap();
    assert!(retry.is_some());
    assert_eq!(db.failed_attempts_for_key(&key).unwrap(), 1);
}

#[test]
fn successful_attempt_holds_the_key() {
    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    let key = billing_idempotency_key(sub, day(2025, 1, 15));
    let attempt = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap()
        .unwrap();

    let done = db
        .complete_billing_attempt(
            attempt.id,
            AttemptStatus::Success,
            Some("order-1"),
            None,
            day(2025, 1, 15),
        )
        .unwrap()
        .unwrap();
    assert_eq!(done.status, AttemptStatus::Success);
    assert_eq!(done.remote_order_ref.as_deref(), Some("order-1"));

    assert_eq!(db.live_billing_attempt(&key).unwrap().unwrap().id, attempt.id);
    assert!(db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 16))
        .unwrap()
        .is_none());
}

#[test]
fn terminal_attempt_is_not_settled_again() {
    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    let key = billing_idempotency_key(sub, day(2025, 1, 15));
    let attempt = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap()
        .unwrap();
    db.complete_billing_attempt(attempt.id, AttemptStatus::Success, Some("o"), None, day(2025, 1, 15))
        .unwrap();

    let again = db
        .complete_billing_attempt(attempt.id, AttemptStatus::Failed, None, Some("x"), day(2025, 1, 16))
        .unwrap();
    assert!(again.is_none());
    assert_eq!(
        db.list_billing_attempts(sub).unwrap()[0].status,
        AttemptStatus::Success
    );
}

#[test]
fn attempt_for_unknown_subscription_is_an_error() {
    let db = Database::open_in_memory().unwrap();
    let result = db.insert_billing_attempt(99, day(2025, 1, 15), "sub-99:2025-01-15", day(2025, 1, 15));
    assert!(result.is_err());
}

#[test]
fn consecutive_failures_reset_on_success() {
    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    let jan = billing_idempotency_key(sub, day(2025, 1, 15));
    let feb = billing_idempotency_key(sub, day(2025, 2, 15));

    let fail = |key: &str| {
        let a = db
            .insert_billing_attempt(sub, day(2025, 1, 15), key, day(2025, 1, 15))
            .unwrap()
            .unwrap();
        db.complete_billing_attempt(a.id, AttemptStatus::Failed, None, Some("declined"), day(2025, 1, 15))
            .unwrap();
    };

    fail(&jan);
    fail(&jan);
    assert_eq!(db.consecutive_billing_failures(sub).unwrap(), 2);

    let ok = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &jan, day(2025, 1, 16))
        .unwrap()
        .unwrap();
    db.complete_billing_attempt(ok.id, AttemptStatus::Success, Some("order"), None, day(2025, 1, 16))
        .unwrap();
    assert_eq!(db.consecutive_billing_failures(sub).unwrap(), 0);

    fail(&feb);
    assert_eq!(db.consecutive_billing_failures(sub).unwrap(), 1);
    assert_eq!(
        db.last_successful_attempt(sub).unwrap().map(|a| a.id),
        Some(ok.id)
    );
}

#[test]
fn pending_attempts_are_listed() {
    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    let key = billing_idempotency_key(sub, day(2025, 1, 15));
    db.insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap();

    let pending = db.pending_billing_attempts().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].idempotency_key, key);
}

#[test]
fn success_on_current_cycle_advances_dates() {
    use crate::entity::{EntityKey, Origin};
    use crate::ledger::Ledger;

    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    db.register(EntityKey::contract(sub), Origin::RemoteCreated, Some("gid://c/1"))
        .unwrap();
    let key = billing_idempotency_key(sub, day(2025, 1, 15));
    let attempt = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap()
        .unwrap();

    let settled = db
        .record_billing_success(attempt.id, Some("order-1"), day(2025, 1, 15))
        .unwrap()
        .unwrap();

    assert_eq!(settled.attempt.status, AttemptStatus::Success);
    assert_eq!(settled.advanced_to, Some((day(2025, 2, 15), day(2025, 2, 15))));
    assert_eq!(db.get_subscription(sub).unwrap().next_billing_at, day(2025, 2, 15));
    assert!(db.sync_state(EntityKey::contract(sub)).unwrap().dirty);

    let again = db
        .record_billing_success(attempt.id, Some("order-1"), day(2025, 1, 16))
        .unwrap();
    assert!(again.is_none());
}

#[test]
fn success_for_a_moved_cycle_keeps_dates() {
    use crate::entity::{EntityKey, Origin};
    use crate::ledger::Ledger;

    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    db.register(EntityKey::contract(sub), Origin::RemoteCreated, Some("gid://c/1"))
        .unwrap();
    let key = billing_idempotency_key(sub, day(2025, 1, 15));
    let attempt = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap()
        .unwrap();
    db.set_subscription_dates(sub, day(2025, 2, 15), day(2025, 2, 15), day(2025, 1, 15))
        .unwrap();

    let settled = db
        .record_billing_success(attempt.id, None, day(2025, 1, 16))
        .unwrap()
        .unwrap();

    assert_eq!(settled.advanced_to, None);
    assert_eq!(db.get_subscription(sub).unwrap().next_billing_at, day(2025, 2, 15));
}

#[test]
fn success_rolls_back_when_the_ledger_write_fails() {
    let db = Database::open_in_memory().unwrap();
    let sub = subscription(&db);
    let key = billing_idempotency_key(sub, day(2025, 1, 15));
    let attempt = db
        .insert_billing_attempt(sub, day(2025, 1, 15), &key, day(2025, 1, 15))
        .unwrap()
        .unwrap();

    let result = db.record_billing_success(attempt.id, Some("order-1"), day(2025, 1, 15));

    assert!(matches!(result, Err(Error::EntityNotFound(_))));
    assert_eq!(
        db.billing_attempt(attempt.id).unwrap().status,
        AttemptStatus::Pending
    );
    assert_eq!(db.get_subscription(sub).unwrap().next_billing_at, day(2025, 1, 15));
}
