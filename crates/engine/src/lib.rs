// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sync-engine: the moving parts of storesync
//!
//! This crate wires the sync-core datastore to a [`sync_remote::RemoteClient`]:
//! the push engine, webhook ingress, subscription lifecycle manager and
//! billing scheduler, plus the configuration file they are built from.
//! [`mock::MockRemote`] stands in for the platform in tests.

pub mod billing;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod mock;
pub mod push;
pub mod retry;
pub mod serialize;
pub mod webhook;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use billing::{acquire_billing_lock, BillingReport, BillingScheduler, BILLING_LOCK_NAME};
pub use config::{Config, FailureAction, CONFIG_FILE_NAME, DB_FILE_NAME};
pub use context::{Context, Engine, Store};
pub use error::{EngineError, PolicyViolation, Result};
pub use lifecycle::{ChargeOutcome, FailurePolicy, Lifecycle, SubscriptionView};
pub use locks::KeyedLocks;
pub use push::{PushEngine, PushOutcome, SweepReport};
pub use retry::RetryPolicy;
pub use webhook::{IngressOutcome, ReplayReport, WebhookEnvelope, WebhookIngress, SIGNATURE_HEADER};
pub use writer::LocalWriter;
