// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Syncable entity types.
//!
//! Every record mirrored on the remote platform is addressed by an
//! [`EntityKey`] (kind + stable local id) and carries a [`SyncState`] row in
//! the ledger. Catalog and customer records share the generic [`Entity`]
//! shape; subscription contracts live in their own table but use the same key
//! and ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Prefix of locally generated remote id placeholders.
pub const PLACEHOLDER_PREFIX: &str = "temp_";

/// Kind of record mirrored on the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Product,
    ProductVariant,
    InventoryLevel,
    Address,
    SellingPlan,
    SubscriptionContract,
}

impl EntityKind {
    /// All kinds, in dependency order (parents before children).
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Customer,
        EntityKind::Address,
        EntityKind::Product,
        EntityKind::ProductVariant,
        EntityKind::InventoryLevel,
        EntityKind::SellingPlan,
        EntityKind::SubscriptionContract,
    ];

    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Product => "product",
            EntityKind::ProductVariant => "product_variant",
            EntityKind::InventoryLevel => "inventory_level",
            EntityKind::Address => "address",
            EntityKind::SellingPlan => "selling_plan",
            EntityKind::SubscriptionContract => "subscription_contract",
        }
    }

    /// Remote collection name, also the prefix of webhook topics.
    pub fn resource(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customers",
            EntityKind::Product => "products",
            EntityKind::ProductVariant => "product_variants",
            EntityKind::InventoryLevel => "inventory_levels",
            EntityKind::Address => "addresses",
            EntityKind::SellingPlan => "selling_plans",
            EntityKind::SubscriptionContract => "subscription_contracts",
        }
    }

    /// Looks up a kind by its remote collection name.
    pub fn from_resource(resource: &str) -> Option<EntityKind> {
        EntityKind::ALL.into_iter().find(|k| k.resource() == resource)
    }

    /// Fields of this kind that hold the local id of another entity.
    ///
    /// The push path replaces them with the parent's remote id; the webhook
    /// path maps remote ids back.
    pub fn references(&self) -> &'static [(&'static str, EntityKind)] {
        match self {
            EntityKind::ProductVariant => &[("product_id", EntityKind::Product)],
            EntityKind::InventoryLevel => &[("variant_id", EntityKind::ProductVariant)],
            EntityKind::Address => &[("customer_id", EntityKind::Customer)],
            _ => &[],
        }
    }

    /// Returns true if records of this kind are stored in the generic
    /// `entities` table.
    pub fn is_generic(&self) -> bool {
        !matches!(self, EntityKind::SubscriptionContract)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.to_lowercase())
            .ok_or_else(|| Error::InvalidEntityKind(s.to_string()))
    }
}

/// Stable address of a syncable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub local_id: i64,
}

impl EntityKey {
    pub fn new(kind: EntityKind, local_id: i64) -> Self {
        EntityKey { kind, local_id }
    }

    /// Key of a subscription contract.
    pub fn contract(local_id: i64) -> Self {
        EntityKey::new(EntityKind::SubscriptionContract, local_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.local_id)
    }
}

/// Which side created the record first.
///
/// A missing remote id means "not yet pushed" for local records; remote
/// records always arrive with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    LocalCreated,
    RemoteCreated,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::LocalCreated => "local_created",
            Origin::RemoteCreated => "remote_created",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Origin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local_created" => Ok(Origin::LocalCreated),
            "remote_created" => Ok(Origin::RemoteCreated),
            _ => Err(Error::InvalidOrigin(s.to_string())),
        }
    }
}

/// Builds a placeholder remote id for a record that has not been pushed yet.
pub fn placeholder_remote_id(now: DateTime<Utc>) -> String {
    format!("{PLACEHOLDER_PREFIX}{}", now.timestamp())
}

/// Returns true if `remote_id` is absent or a local placeholder.
pub fn is_unassigned(remote_id: Option<&str>) -> bool {
    match remote_id {
        None => true,
        Some(id) => id.is_empty() || id.starts_with(PLACEHOLDER_PREFIX),
    }
}

/// Classification of the latest push failure, persisted on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Transient,
    Conflict,
    Dependency,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Transient => "transient",
            FailureKind::Conflict => "conflict",
            FailureKind::Dependency => "dependency",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "validation" => Ok(FailureKind::Validation),
            "transient" => Ok(FailureKind::Transient),
            "conflict" => Ok(FailureKind::Conflict),
            "dependency" => Ok(FailureKind::Dependency),
            _ => Err(Error::InvalidErrorKind(s.to_string())),
        }
    }
}

/// Ledger row of one syncable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub key: EntityKey,
    /// Remote identifier, or a `temp_` placeholder until the first create.
    pub remote_id: Option<String>,
    pub origin: Origin,
    pub dirty: bool,
    /// Fields changed locally since the last successful push.
    pub dirty_fields: BTreeSet<String>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<FailureKind>,
    pub last_pushed_at: Option<DateTime<Utc>>,
    pub last_pulled_at: Option<DateTime<Utc>>,
    /// Set by a conflict failure; pushes are skipped until cleared.
    pub push_paused: bool,
}

impl SyncState {
    /// Returns true once the remote platform has assigned an identifier.
    pub fn has_remote_id(&self) -> bool {
        !is_unassigned(self.remote_id.as_deref())
    }

    /// Returns the remote identifier if it is a real one.
    pub fn real_remote_id(&self) -> Option<&str> {
        if self.has_remote_id() {
            self.remote_id.as_deref()
        } else {
            None
        }
    }
}

/// A customer, catalog or inventory record.
///
/// Field values are kept as JSON so that every kind shares one storage path.
/// `field_times` records when each field last changed on either side and is
/// the authority for last-writer-wins merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    /// Stable merchant-assigned code (email, SKU, handle) used for
    /// create-if-absent lookups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub fields: BTreeMap<String, Value>,
    pub field_times: BTreeMap<String, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Returns true if the record has been tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns the local id stored in a reference field, if any.
    pub fn reference(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
