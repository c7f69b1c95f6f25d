// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local records to remote payloads, and back.
//!
//! Reference fields hold local ids locally and remote ids on the wire. An
//! outbound reference whose parent has no real remote id is a dependency
//! failure; an inbound reference to an unknown remote id leaves the event
//! unresolved.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use sync_core::{
    Database, Entity, EntityKey, EntityKind, Ledger, LineItem, SubscriptionContract,
};

use crate::error::{EngineError, Result};

/// Keys of every record a contract points at.
pub fn contract_dependencies(
    customer_id: i64,
    selling_plan_id: i64,
    delivery_address_id: i64,
    line_items: &[LineItem],
) -> Vec<EntityKey> {
    let mut keys = vec![
        EntityKey::new(EntityKind::Customer, customer_id),
        EntityKey::new(EntityKind::SellingPlan, selling_plan_id),
        EntityKey::new(EntityKind::Address, delivery_address_id),
    ];
    for line in line_items {
        let key = EntityKey::new(EntityKind::ProductVariant, line.variant_id);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// The subset of `keys` without a real remote id.
pub fn unresolved(db: &Database, keys: &[EntityKey]) -> Result<Vec<EntityKey>> {
    let mut missing = Vec::new();
    for key in keys {
        let assigned = db
            .find_sync_state(*key)?
            .is_some_and(|state| state.has_remote_id());
        if !assigned {
            missing.push(*key);
        }
    }
    Ok(missing)
}

/// Remote ids for `keys`, failing with every unresolved key at once.
fn remote_ids(db: &Database, keys: &[EntityKey]) -> Result<BTreeMap<EntityKey, String>> {
    let mut ids = BTreeMap::new();
    let mut missing = Vec::new();
    for key in keys {
        match db
            .find_sync_state(*key)?
            .and_then(|state| state.real_remote_id().map(str::to_string))
        {
            Some(id) => {
                ids.insert(*key, id);
            }
            None => missing.push(*key),
        }
    }
    if missing.is_empty() {
        Ok(ids)
    } else {
        Err(EngineError::Dependency { missing })
    }
}

/// Remote payload of a generic entity.
pub fn entity_payload(db: &Database, entity: &Entity) -> Result<Value> {
    let mut payload: Map<String, Value> = entity
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let refs: Vec<(&str, EntityKey)> = entity
        .key
        .kind
        .references()
        .iter()
        .filter_map(|(field, parent)| {
            entity
                .reference(field)
                .map(|id| (*field, EntityKey::new(*parent, id)))
        })
        .collect();
    let keys: Vec<EntityKey> = refs.iter().map(|(_, key)| *key).collect();
    let ids = remote_ids(db, &keys)?;
    for (field, key) in refs {
        if let Some(id) = ids.get(&key) {
            payload.insert(field.to_string(), Value::String(id.clone()));
        }
    }

    if let Some(code) = &entity.code {
        payload
            .entry("code")
            .or_insert_with(|| Value::String(code.clone()));
    }
    Ok(Value::Object(payload))
}

/// Remote payload of a subscription contract.
pub fn contract_payload(db: &Database, contract: &SubscriptionContract) -> Result<Value> {
    let keys = contract_dependencies(
        contract.customer_id,
        contract.selling_plan_id,
        contract.delivery_address_id,
        &contract.line_items,
    );
    let ids = remote_ids(db, &keys)?;
    let id_of = |key: EntityKey| ids.get(&key).cloned().unwrap_or_default();

    let lines: Vec<Value> = contract
        .line_items
        .iter()
        .map(|line| {
            json!({
                "variant_id": id_of(EntityKey::new(EntityKind::ProductVariant, line.variant_id)),
                "quantity": line.quantity,
                "unit_price_cents": line.unit_price_cents,
            })
        })
        .collect();

    let mut payload = json!({
        "customer_id": id_of(EntityKey::new(EntityKind::Customer, contract.customer_id)),
        "selling_plan_id": id_of(EntityKey::new(EntityKind::SellingPlan, contract.selling_plan_id)),
        "delivery_address_id": id_of(EntityKey::new(EntityKind::Address, contract.delivery_address_id)),
        "status": contract.status.as_str(),
        "next_billing_at": contract.next_billing_at.to_rfc3339(),
        "next_delivery_at": contract.next_delivery_at.to_rfc3339(),
        "billing_interval": contract.interval.to_string(),
        "line_items": lines,
    });
    if let (Some(method), Some(map)) = (&contract.payment_method_ref, payload.as_object_mut()) {
        map.insert("payment_method_id".to_string(), Value::String(method.clone()));
    }
    Ok(payload)
}

/// Replace remote ids in inbound reference fields with local ids.
///
/// Returns the keys of parents that are not known locally yet.
pub fn localize_references(
    db: &Database,
    kind: EntityKind,
    fields: &mut BTreeMap<String, Value>,
) -> Result<Vec<(EntityKind, String)>> {
    let mut unknown = Vec::new();
    for (field, parent) in kind.references() {
        let Some(remote_id) = fields.get(*field).and_then(Value::as_str).map(str::to_string)
        else {
            continue;
        };
        match db.key_for_remote_id(*parent, &remote_id)? {
            Some(key) => {
                fields.insert(field.to_string(), Value::from(key.local_id));
            }
            None => unknown.push((*parent, remote_id)),
        }
    }
    Ok(unknown)
}

#[cfg(test)]
#[path = "serialize_tests.rs"]
mod tests;
