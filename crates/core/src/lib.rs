// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sync-core: Shared library for the storesync engine
//!
//! This crate provides the model types, the local datastore, the sync state
//! ledger, the durable push queue and the last-writer-wins merge used by the
//! engine, the storesyncd daemon and the storesync CLI.

pub mod changeset;
pub mod clock;
pub mod db;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod subscription;

pub use changeset::ChangeSet;
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{
    BillingSettlement, Database, QueueItem, QueueState, QueueStats, StoredEvent, WebhookState,
};
pub use entity::{
    is_unassigned, placeholder_remote_id, Entity, EntityKey, EntityKind, FailureKind, Origin,
    SyncState, PLACEHOLDER_PREFIX,
};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use merge::{Merge, MergeOutcome, RemoteContractFields};
pub use subscription::{
    billing_idempotency_key, cycle_changes, AttemptStatus, BillingAttempt, BillingInterval,
    IntervalUnit, LineItem, NewSubscription, SkipPolicy, SkipRecord, SkipStatus,
    SubscriptionContract, SubscriptionStatus,
};
