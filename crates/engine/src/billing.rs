// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Billing scheduler.
//!
//! A run charges every ACTIVE contract whose next billing date is at or
//! before `as_of`. Runs are serialized in-process by a run lock and across
//! processes by an exclusive lock file; the per-cycle idempotency key stays
//! the backstop against double charges.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::lifecycle::{ChargeOutcome, Lifecycle};

/// Lock file name inside the state directory.
pub const BILLING_LOCK_NAME: &str = "billing.lock";

/// Tally of one billing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillingReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
    pub already_attempted: usize,
    pub not_synced: usize,
    pub errors: usize,
}

impl BillingReport {
    fn record(&mut self, subscription_id: i64, result: Result<ChargeOutcome>) {
        match result {
            Ok(ChargeOutcome::Succeeded { .. }) => self.succeeded += 1,
            Ok(ChargeOutcome::Failed { .. }) => self.failed += 1,
            Ok(ChargeOutcome::Pending { .. }) => self.pending += 1,
            Ok(ChargeOutcome::AlreadyAttempted { .. } | ChargeOutcome::AlreadySettled) => {
                self.already_attempted += 1
            }
            Ok(ChargeOutcome::NotSynced) => self.not_synced += 1,
            Ok(ChargeOutcome::Inactive) => {}
            Err(e) => {
                warn!(subscription_id, error = %e, "billing error");
                self.errors += 1;
            }
        }
    }
}

#[derive(Clone)]
pub struct BillingScheduler {
    lifecycle: Lifecycle,
    run_lock: Arc<Mutex<()>>,
}

impl BillingScheduler {
    pub fn new(lifecycle: Lifecycle) -> Self {
        BillingScheduler {
            lifecycle,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Charge every contract due at `as_of`.
    ///
    /// Fails with [`EngineError::BillingBusy`] if a run is already in
    /// progress in this process. Per-subscription errors are counted, not
    /// propagated.
    pub fn run_due(&self, as_of: DateTime<Utc>) -> Result<BillingReport> {
        let Some(_running) = self.run_lock.try_lock() else {
            return Err(EngineError::BillingBusy);
        };

        let due: Vec<i64> = self
            .lifecycle
            .due_subscriptions(as_of)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let mut report = BillingReport {
            due: due.len(),
            ..BillingReport::default()
        };
        for subscription_id in due {
            let result = self.lifecycle.charge_cycle(subscription_id);
            report.record(subscription_id, result);
        }

        info!(
            %as_of,
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            pending = report.pending,
            "billing run finished"
        );
        Ok(report)
    }
}

/// Take the cross-process billing lock in `state_dir`.
///
/// The lock holds until the returned file is dropped.
pub fn acquire_billing_lock(state_dir: &Path) -> Result<File> {
    use fs2::FileExt;

    fs::create_dir_all(state_dir)?;
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(state_dir.join(BILLING_LOCK_NAME))?;
    file.try_lock_exclusive()
        .map_err(|_| EngineError::BillingBusy)?;
    Ok(file)
}

#[cfg(test)]
#[path = "billing_tests.rs"]
mod tests;
