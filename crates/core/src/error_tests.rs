// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::entity::{EntityKey, EntityKind};
use yare::parameterized;

#[parameterized(
    entity_not_found = { Error::EntityNotFound(EntityKey::new(EntityKind::Customer, 7)), "customer/7" },
    subscription_not_found = { Error::SubscriptionNotFound(42), "42" },
    invalid_kind = { Error::InvalidEntityKind("widget".into()), "widget" },
    field_required = { Error::FieldRequired { field: "line_items" }, "line_items is required" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn error_invalid_transition_display() {
    let err = Error::InvalidTransition {
        from: "cancelled".into(),
        to: "active".into(),
        valid_targets: "none (terminal)".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("cancelled"));
    assert!(msg.contains("active"));
    assert!(msg.contains("hint"));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}
