// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use crate::test_support::{day, Harness};
use serde_json::json;
use sync_core::ChangeSet;

#[test]
fn contract_dependencies_dedupe_variants() {
    let lines = vec![
        LineItem {
            variant_id: 7,
            quantity: 1,
            unit_price_cents: 100,
        },
        LineItem {
            variant_id: 7,
            quantity: 3,
            unit_price_cents: 100,
        },
    ];
    let deps = contract_dependencies(1, 2, 3, &lines);
    assert_eq!(
        deps,
        vec![
            EntityKey::new(EntityKind::Customer, 1),
            EntityKey::new(EntityKind::SellingPlan, 2),
            EntityKey::new(EntityKind::Address, 3),
            EntityKey::new(EntityKind::ProductVariant, 7),
        ]
    );
}

#[test]
fn entity_payload_maps_references_to_remote_ids() {
    let h = Harness::new();
    let product = h.synced(EntityKind::Product, Some("tea"), ChangeSet::new().set("title", "Tea"));
    let variant = h.create(
        EntityKind::ProductVariant,
        Some("TEA-100G"),
        ChangeSet::new().set("product_id", product.local_id).set("grams", 100),
    );

    let db = h.store();
    let entity = db.get_entity(variant).unwrap();
    let payload = entity_payload(&db, &entity).unwrap();
    assert_eq!(payload["product_id"], json!(h.remote.records(EntityKind::Product)[0].id));
    assert_eq!(payload["code"], json!("TEA-100G"));
    assert_eq!(payload["grams"], json!(100));
}

#[test]
fn entity_payload_reports_unpushed_parent() {
    let h = Harness::new();
    let customer = h.create(EntityKind::Customer, Some("a@b.c"), ChangeSet::new());
    let address = h.create(
        EntityKind::Address,
        None,
        ChangeSet::new().set("customer_id", customer.local_id),
    );

    let db = h.store();
    let entity = db.get_entity(address).unwrap();
    match entity_payload(&db, &entity) {
        Err(EngineError::Dependency { missing }) => assert_eq!(missing, vec![customer]),
        other => panic!("expected dependency error, got {other:?}"),
    }
}

#[test]
fn contract_payload_uses_remote_ids() {
    let h = Harness::new();
    let catalog = h.catalog();
    let contract = h.subscription(&catalog, day(2025, 1, 15));

    let db = h.store();
    let payload = contract_payload(&db, &contract).unwrap();
    let customer_id = db.sync_state(catalog.customer).unwrap().remote_id.unwrap();
    let variant_id = db.sync_state(catalog.variant).unwrap().remote_id.unwrap();
    assert_eq!(payload["customer_id"], json!(customer_id));
    assert_eq!(payload["line_items"][0]["variant_id"], json!(variant_id));
    assert_eq!(payload["line_items"][0]["quantity"], json!(2));
    assert_eq!(payload["billing_interval"], json!(contract.interval.to_string()));
    assert!(payload.get("payment_method_id").is_none());
}

#[test]
fn localize_references_maps_known_and_reports_unknown() {
    let h = Harness::new();
    let customer = h.synced(EntityKind::Customer, Some("a@b.c"), ChangeSet::new());
    let customer_remote = h.remote_id(customer).unwrap();

    let db = h.store();
    let mut known = BTreeMap::from([("customer_id".to_string(), json!(customer_remote))]);
    assert!(localize_references(&db, EntityKind::Address, &mut known)
        .unwrap()
        .is_empty());
    assert_eq!(known["customer_id"], json!(customer.local_id));

    let mut unknown = BTreeMap::from([("customer_id".to_string(), json!("gid://shop/Customer/999"))]);
    let missing = localize_references(&db, EntityKind::Address, &mut unknown).unwrap();
    assert_eq!(
        missing,
        vec![(EntityKind::Customer, "gid://shop/Customer/999".to_string())]
    );
}
