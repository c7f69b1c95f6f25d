// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Merge remote changes into local state with field-level last-writer-wins.
//!
//! Merge rules:
//! - A remote field value is applied iff the event time is strictly newer
//!   than the field's local change time.
//! - Applied fields take the event time as their change time and are never
//!   marked dirty, so a webhook cannot echo back as a push.
//! - A locally dirty field that is newer keeps its value and stays dirty.
//! - Remote creates insert a REMOTE_CREATED record that is not dirty.
//! - Remote deletes tombstone the record and drop any pending push.
//!
//! Every merge runs in one transaction and stamps `last_pulled_at`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::changeset::ChangeSet;
use crate::db::{self, Database};
use crate::entity::{Entity, EntityKey, EntityKind, Origin};
use crate::error::{Error, Result};
use crate::ledger::{self, Ledger};
use crate::subscription::{
    SubscriptionContract, SubscriptionStatus, CONTRACT_FIELD_NEXT_BILLING,
    CONTRACT_FIELD_NEXT_DELIVERY, CONTRACT_FIELD_STATUS,
};

/// Contract fields carried by a remote contract event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteContractFields {
    pub status: Option<SubscriptionStatus>,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub next_delivery_at: Option<DateTime<Utc>>,
}

/// What a merge did, field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Fields overwritten with the remote value.
    pub applied: BTreeSet<String>,
    /// Fields kept because the local change is as new or newer.
    pub stale: BTreeSet<String>,
    /// Fields refused because the value is not reachable locally
    /// (an illegal status transition).
    pub rejected: BTreeSet<String>,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Trait for applying remote changes with last-writer-wins resolution.
pub trait Merge {
    /// Apply remote field values to a generic entity.
    fn merge_remote_fields(
        &self,
        key: EntityKey,
        fields: &BTreeMap<String, Value>,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome>;

    /// Apply remote status and dates to a contract.
    fn merge_remote_contract(
        &self,
        id: i64,
        fields: &RemoteContractFields,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome>;

    /// Insert a record first created on the remote side.
    fn insert_remote_entity(
        &self,
        kind: EntityKind,
        remote_id: &str,
        code: Option<&str>,
        fields: &BTreeMap<String, Value>,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Entity>;

    /// Tombstone a record deleted on the remote side.
    ///
    /// Returns false if it was already tombstoned.
    fn tombstone_remote(&self, key: EntityKey, now: DateTime<Utc>) -> Result<bool>;
}

/// Decide which remote fields win against local change times.
fn resolve<'a, I>(
    candidates: I,
    field_times: &BTreeMap<String, DateTime<Utc>>,
    occurred_at: DateTime<Utc>,
) -> (Vec<&'a str>, BTreeSet<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut winners = Vec::new();
    let mut stale = BTreeSet::new();
    for field in candidates {
        match field_times.get(field) {
            Some(local) if *local >= occurred_at => {
                stale.insert(field.to_string());
            }
            _ => winners.push(field),
        }
    }
    (winners, stale)
}

/// Drop applied fields from the dirty set.
///
/// A row that was dirty without field detail (a pending create) stays dirty.
fn settle_dirty(conn: &rusqlite::Connection, key: EntityKey, applied: &BTreeSet<String>) -> Result<()> {
    if applied.is_empty() {
        return Ok(());
    }
    let state = ledger::load_state(conn, key)?.ok_or(Error::EntityNotFound(key))?;
    if state.dirty_fields.is_empty() {
        return Ok(());
    }
    let remaining: BTreeSet<String> = state.dirty_fields.difference(applied).cloned().collect();
    if remaining != state.dirty_fields {
        ledger::store_dirty(conn, key, !remaining.is_empty(), &remaining)?;
    }
    Ok(())
}

impl Merge for Database {
    fn merge_remote_fields(
        &self,
        key: EntityKey,
        fields: &BTreeMap<String, Value>,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let mut entity = db::load_entity(&tx, key)?.ok_or(Error::EntityNotFound(key))?;
        if entity.is_deleted() {
            return Err(Error::EntityDeleted(key));
        }

        let (winners, stale) = resolve(fields.keys().map(String::as_str), &entity.field_times, occurred_at);
        let mut applied = BTreeSet::new();
        for field in winners {
            if let Some(value) = fields.get(field) {
                entity.fields.insert(field.to_string(), value.clone());
                entity.field_times.insert(field.to_string(), occurred_at);
                applied.insert(field.to_string());
            }
        }

        if !applied.is_empty() {
            db::store_fields(&tx, key, &entity.fields, &entity.field_times, now)?;
            settle_dirty(&tx, key, &applied)?;
        }
        ledger::touch_pulled(&tx, key, now)?;
        tx.commit()?;

        Ok(MergeOutcome {
            applied,
            stale,
            rejected: BTreeSet::new(),
        })
    }

    fn merge_remote_contract(
        &self,
        id: i64,
        fields: &RemoteContractFields,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let mut contract: SubscriptionContract =
            db::load_subscription(&tx, id)?.ok_or(Error::SubscriptionNotFound(id))?;

        let mut candidates = Vec::new();
        if fields.status.is_some() {
            candidates.push(CONTRACT_FIELD_STATUS);
        }
        if fields.next_billing_at.is_some() {
            candidates.push(CONTRACT_FIELD_NEXT_BILLING);
        }
        if fields.next_delivery_at.is_some() {
            candidates.push(CONTRACT_FIELD_NEXT_DELIVERY);
        }
        let (winners, stale) = resolve(candidates, &contract.field_times, occurred_at);

        let mut outcome = MergeOutcome {
            stale,
            ..MergeOutcome::default()
        };
        for field in winners {
            match field {
                CONTRACT_FIELD_STATUS => {
                    if let Some(status) = fields.status {
                        if status != contract.status && !contract.status.can_transition_to(status) {
                            outcome.rejected.insert(field.to_string());
                            continue;
                        }
                        contract.status = status;
                    }
                }
                CONTRACT_FIELD_NEXT_BILLING => {
                    if let Some(at) = fields.next_billing_at {
                        if at != contract.next_billing_at {
                            contract.next_billing_at = at;
                            contract.billing_anchor_at = at;
                        }
                    }
                }
                CONTRACT_FIELD_NEXT_DELIVERY => {
                    if let Some(at) = fields.next_delivery_at {
                        if at != contract.next_delivery_at {
                            contract.next_delivery_at = at;
                            contract.delivery_anchor_at = at;
                        }
                    }
                }
                _ => continue,
            }
            contract.field_times.insert(field.to_string(), occurred_at);
            outcome.applied.insert(field.to_string());
        }

        let key = contract.key();
        if !outcome.applied.is_empty() {
            contract.updated_at = now;
            db::store_contract_state(&tx, &contract)?;
            settle_dirty(&tx, key, &outcome.applied)?;
        }
        ledger::touch_pulled(&tx, key, now)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn insert_remote_entity(
        &self,
        kind: EntityKind,
        remote_id: &str,
        code: Option<&str>,
        fields: &BTreeMap<String, Value>,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Entity> {
        let changes: ChangeSet = fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let tx = self.conn.unchecked_transaction()?;
        let entity = self.insert_entity(kind, code, &changes, occurred_at)?;
        self.register(entity.key, Origin::RemoteCreated, Some(remote_id))?;
        ledger::touch_pulled(&tx, entity.key, now)?;
        tx.commit()?;
        Ok(entity)
    }

    fn tombstone_remote(&self, key: EntityKey, now: DateTime<Utc>) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let tombstoned = self.tombstone_entity(key, now)?;
        ledger::store_dirty(&tx, key, false, &BTreeSet::new())?;
        db::queue_remove(&tx, key)?;
        ledger::touch_pulled(&tx, key, now)?;
        tx.commit()?;
        Ok(tombstoned)
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
