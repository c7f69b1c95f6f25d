// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for sync-core operations.

use thiserror::Error;

use crate::entity::EntityKey;

/// All possible errors that can occur in sync-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityKey),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(i64),

    #[error("entity {0} is deleted\n  hint: tombstoned entities cannot be edited or pushed")]
    EntityDeleted(EntityKey),

    #[error("invalid entity kind: '{0}'\n  hint: valid kinds are: customer, product, product_variant, inventory_level, address, selling_plan, subscription_contract")]
    InvalidEntityKind(String),

    #[error("invalid origin: '{0}'")]
    InvalidOrigin(String),

    #[error("invalid subscription status: '{0}'\n  hint: valid statuses are: draft, active, paused, cancelled")]
    InvalidSubscriptionStatus(String),

    #[error("invalid status transition: cannot go from {from} to {to}\n  hint: from '{from}' you can go to: {valid_targets}")]
    InvalidTransition {
        from: String,
        to: String,
        valid_targets: String,
    },

    #[error("invalid billing interval: '{0}'\n  hint: use <count><unit>, e.g. 1month, 2week, 30day")]
    InvalidInterval(String),

    #[error("invalid {kind} status: '{value}'")]
    InvalidRecordStatus { kind: &'static str, value: String },

    #[error("invalid error kind: '{0}'")]
    InvalidErrorKind(String),

    #[error("invalid queue state: '{0}'")]
    InvalidQueueState(String),

    #[error("{field} is required")]
    FieldRequired { field: &'static str },

    #[error("date arithmetic overflow advancing {0}")]
    DateOverflow(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for sync-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
