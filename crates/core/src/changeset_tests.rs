// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn later_assignment_replaces_earlier() {
    let changes = ChangeSet::new().set("title", "Old").set("title", "New");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.get("title"), Some(&json!("New")));
}

#[test]
fn without_noops_keeps_real_changes() {
    let mut current = BTreeMap::new();
    current.insert("email".to_string(), json!("a@example.com"));
    current.insert("first_name".to_string(), json!("Ada"));

    let changes = ChangeSet::new()
        .set("email", "a@example.com")
        .set("first_name", "Grace")
        .set("phone", "555-0100")
        .without_noops(&current);

    let names: Vec<String> = changes.field_names().into_iter().collect();
    assert_eq!(names, vec!["first_name".to_string(), "phone".to_string()]);
}

#[test]
fn empty_change_set() {
    let changes = ChangeSet::new();
    assert!(changes.is_empty());
    assert!(changes.field_names().is_empty());
}
