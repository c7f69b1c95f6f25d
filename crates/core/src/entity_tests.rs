// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::TimeZone;
use yare::parameterized;

#[parameterized(
    customer = { EntityKind::Customer, "customer", "customers" },
    variant = { EntityKind::ProductVariant, "product_variant", "product_variants" },
    inventory = { EntityKind::InventoryLevel, "inventory_level", "inventory_levels" },
    contract = { EntityKind::SubscriptionContract, "subscription_contract", "subscription_contracts" },
)]
fn kind_names_round_trip(kind: EntityKind, name: &str, resource: &str) {
    assert_eq!(kind.as_str(), name);
    assert_eq!(name.parse::<EntityKind>().unwrap(), kind);
    assert_eq!(EntityKind::from_resource(resource), Some(kind));
}

#[test]
fn kind_rejects_unknown() {
    assert!("widget".parse::<EntityKind>().is_err());
    assert_eq!(EntityKind::from_resource("widgets"), None);
}

#[test]
fn parents_precede_children_in_all() {
    for (idx, kind) in EntityKind::ALL.iter().enumerate() {
        for (_, parent) in kind.references() {
            let parent_idx = EntityKind::ALL.iter().position(|k| k == parent).unwrap();
            assert!(parent_idx < idx, "{parent} must come before {kind}");
        }
    }
}

#[test]
fn placeholder_uses_unix_seconds() {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    assert_eq!(placeholder_remote_id(now), "temp_1700000000");
}

#[parameterized(
    none = { None, true },
    empty = { Some(""), true },
    placeholder = { Some("temp_1700000000"), true },
    real = { Some("gid://shop/Customer/123"), false },
)]
fn unassigned_detection(remote_id: Option<&str>, expected: bool) {
    assert_eq!(is_unassigned(remote_id), expected);
}

#[test]
fn key_display() {
    assert_eq!(EntityKey::contract(9).to_string(), "subscription_contract/9");
}
