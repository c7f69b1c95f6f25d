// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::subscription::{BillingInterval, LineItem, NewSubscription};
use chrono::{Duration, TimeZone};
use serde_json::json;

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
}

fn remote_fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A pushed customer created at hour 1.
fn synced_customer(db: &Database) -> EntityKey {
    let entity = db
        .insert_entity(
            EntityKind::Customer,
            Some("ada@example.com"),
            &ChangeSet::new()
                .set("email", "ada@example.com")
                .set("first_name", "Ada"),
            t(1),
        )
        .unwrap();
    db.register(entity.key, Origin::LocalCreated, None).unwrap();
    db.mark_pushed(entity.key, Some("gid://shop/Customer/1"), t(1))
        .unwrap();
    entity.key
}

#[test]
fn newer_remote_value_is_applied_without_dirtying() {
    let db = Database::open_in_memory().unwrap();
    let key = synced_customer(&db);

    let outcome = db
        .merge_remote_fields(key, &remote_fields(&[("first_name", json!("Augusta"))]), t(2), t(3))
        .unwrap();

    assert_eq!(outcome.applied.len(), 1);
    let entity = db.get_entity(key).unwrap();
    assert_eq!(entity.fields["first_name"], json!("Augusta"));
    assert_eq!(entity.field_times["first_name"], t(2));

    let state = db.sync_state(key).unwrap();
    assert!(!state.dirty);
    assert_eq!(state.last_pulled_at, Some(t(3)));
    assert!(db.list_queue().unwrap().is_empty());
}

#[test]
fn equal_or_older_remote_value_is_stale() {
    let db = Database::open_in_memory().unwrap();
    let key = synced_customer(&db);

    let outcome = db
        .merge_remote_fields(
            key,
            &remote_fields(&[("first_name", json!("Old")), ("email", json!("old@x"))]),
            t(1),
            t(3),
        )
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(outcome.stale.len(), 2);
    assert_eq!(db.get_entity(key).unwrap().fields["first_name"], json!("Ada"));
}

#[test]
fn newer_local_dirty_field_survives_and_stays_dirty() {
    let db = Database::open_in_memory().unwrap();
    let key = synced_customer(&db);

    let local = ChangeSet::new().set("first_name", "Local");
    let applied = db.update_entity_fields(key, local, t(5)).unwrap();
    db.mark_dirty(key, &applied, "update", t(5)).unwrap();

    let outcome = db
        .merge_remote_fields(
            key,
            &remote_fields(&[("first_name", json!("Remote")), ("email", json!("new@x"))]),
            t(4),
            t(6),
        )
        .unwrap();

    assert!(outcome.stale.contains("first_name"));
    assert!(outcome.applied.contains("email"));
    let entity = db.get_entity(key).unwrap();
    assert_eq!(entity.fields["first_name"], json!("Local"));
    assert_eq!(entity.fields["email"], json!("new@x"));

    let state = db.sync_state(key).unwrap();
    assert!(state.dirty);
    assert!(state.dirty_fields.contains("first_name"));
    assert!(!state.dirty_fields.contains("email"));
}

#[test]
fn remote_overwrite_of_older_dirty_field_clears_it() {
    let db = Database::open_in_memory().unwrap();
    let key = synced_customer(&db);

    let applied = db
        .update_entity_fields(key, ChangeSet::new().set("first_name", "Local"), t(2))
        .unwrap();
    db.mark_dirty(key, &applied, "update", t(2)).unwrap();

    db.merge_remote_fields(key, &remote_fields(&[("first_name", json!("Remote"))]), t(3), t(4))
        .unwrap();

    let state = db.sync_state(key).unwrap();
    assert!(!state.dirty);
    assert!(state.dirty_fields.is_empty());
}

#[test]
fn applying_the_same_event_twice_converges() {
    let db = Database::open_in_memory().unwrap();
    let key = synced_customer(&db);
    let fields = remote_fields(&[("first_name", json!("Augusta"))]);

    let first = db.merge_remote_fields(key, &fields, t(2), t(3)).unwrap();
    let second = db.merge_remote_fields(key, &fields, t(2), t(3)).unwrap();

    assert_eq!(first.applied.len(), 1);
    assert!(second.is_noop());
    assert_eq!(db.get_entity(key).unwrap().fields["first_name"], json!("Augusta"));
}

#[test]
fn merge_into_tombstone_is_refused() {
    let db = Database::open_in_memory().unwrap();
    let key = synced_customer(&db);
    db.tombstone_remote(key, t(2)).unwrap();

    let err = db
        .merge_remote_fields(key, &remote_fields(&[("first_name", json!("X"))]), t(3), t(3))
        .unwrap_err();
    assert!(matches!(err, Error::EntityDeleted(_)));
}

#[test]
fn remote_create_is_clean_and_mapped() {
    let db = Database::open_in_memory().unwrap();

    let entity = db
        .insert_remote_entity(
            EntityKind::Product,
            "gid://shop/Product/7",
            Some("tea"),
            &remote_fields(&[("title", json!("Tea"))]),
            t(2),
            t(3),
        )
        .unwrap();

    let state = db.sync_state(entity.key).unwrap();
    assert_eq!(state.origin, Origin::RemoteCreated);
    assert!(!state.dirty);
    assert_eq!(state.last_pulled_at, Some(t(3)));
    assert_eq!(
        db.key_for_remote_id(EntityKind::Product, "gid://shop/Product/7")
            .unwrap(),
        Some(entity.key)
    );
    assert!(db.list_queue().unwrap().is_empty());
}

#[test]
fn remote_delete_tombstones_and_drops_pending_push() {
    let db = Database::open_in_memory().unwrap();
    let key = synced_customer(&db);
    db.mark_dirty(key, &ChangeSet::new().set("first_name", "X"), "update", t(2))
        .unwrap();

    assert!(db.tombstone_remote(key, t(3)).unwrap());
    assert!(!db.tombstone_remote(key, t(4)).unwrap());

    assert!(db.get_entity(key).unwrap().is_deleted());
    assert!(!db.sync_state(key).unwrap().dirty);
    assert!(db.list_queue().unwrap().is_empty());
}

fn active_contract(db: &Database) -> SubscriptionContract {
    let contract = db
        .insert_subscription(
            &NewSubscription {
                customer_id: 1,
                selling_plan_id: 1,
                first_billing_at: t(0) + Duration::days(14),
                first_delivery_at: t(0) + Duration::days(17),
                interval: BillingInterval::monthly(),
                line_items: vec![LineItem {
                    variant_id: 1,
                    quantity: 1,
                    unit_price_cents: 500,
                }],
                delivery_address_id: 1,
                payment_method_ref: None,
            },
            SubscriptionStatus::Active,
            t(1),
        )
        .unwrap();
    db.register(contract.key(), Origin::LocalCreated, None)
        .unwrap();
    db.mark_pushed(contract.key(), Some("gid://shop/SubscriptionContract/1"), t(1))
        .unwrap();
    contract
}

#[test]
fn remote_contract_cancel_is_applied() {
    let db = Database::open_in_memory().unwrap();
    let contract = active_contract(&db);

    let outcome = db
        .merge_remote_contract(
            contract.id,
            &RemoteContractFields {
                status: Some(SubscriptionStatus::Cancelled),
                ..RemoteContractFields::default()
            },
            t(2),
            t(3),
        )
        .unwrap();

    assert!(outcome.applied.contains(CONTRACT_FIELD_STATUS));
    assert_eq!(
        db.get_subscription(contract.id).unwrap().status,
        SubscriptionStatus::Cancelled
    );
    assert!(!db.sync_state(contract.key()).unwrap().dirty);
}

#[test]
fn remote_contract_illegal_transition_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let contract = active_contract(&db);

    let outcome = db
        .merge_remote_contract(
            contract.id,
            &RemoteContractFields {
                status: Some(SubscriptionStatus::Draft),
                next_billing_at: Some(t(0) + Duration::days(20)),
                next_delivery_at: None,
            },
            t(2),
            t(3),
        )
        .unwrap();

    assert!(outcome.rejected.contains(CONTRACT_FIELD_STATUS));
    assert!(outcome.applied.contains(CONTRACT_FIELD_NEXT_BILLING));
    let stored = db.get_subscription(contract.id).unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(stored.next_billing_at, t(0) + Duration::days(20));
}

#[test]
fn stale_remote_contract_dates_are_ignored() {
    let db = Database::open_in_memory().unwrap();
    let contract = active_contract(&db);
    db.set_subscription_dates(
        contract.id,
        t(0) + Duration::days(45),
        t(0) + Duration::days(48),
        t(5),
    )
    .unwrap();

    let outcome = db
        .merge_remote_contract(
            contract.id,
            &RemoteContractFields {
                next_billing_at: Some(t(0) + Duration::days(14)),
                ..RemoteContractFields::default()
            },
            t(4),
            t(6),
        )
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(
        db.get_subscription(contract.id).unwrap().next_billing_at,
        t(0) + Duration::days(45)
    );
}

#[test]
fn remote_date_change_restarts_the_schedule() {
    let db = Database::open_in_memory().unwrap();
    let contract = active_contract(&db);
    let moved = t(0) + Duration::days(20);

    db.merge_remote_contract(
        contract.id,
        &RemoteContractFields {
            next_billing_at: Some(moved),
            ..RemoteContractFields::default()
        },
        t(2),
        t(3),
    )
    .unwrap();

    let stored = db.get_subscription(contract.id).unwrap();
    assert_eq!(stored.next_billing_at, moved);
    assert_eq!(stored.billing_anchor_at, moved);
    assert_eq!(stored.delivery_anchor_at, contract.delivery_anchor_at);
}
