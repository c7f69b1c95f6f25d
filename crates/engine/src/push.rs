// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Push engine: local changes to the remote platform.
//!
//! A push of one entity runs under its key lock:
//! 1. Read the ledger. Clean or paused entities make no remote call.
//! 2. Serialize, mapping references to remote ids (dependency check).
//! 3. Call the remote without holding the store: update when a real remote
//!    id exists; otherwise look the record up by merchant code, else create
//!    with a deterministic idempotency key.
//! 4. Write back: the remote id replaces the placeholder and dirty clears in
//!    one transaction, or the failure is classified and recorded.
//!
//! Sweeps drain the durable push queue with a bounded worker pool, one kind
//! at a time in dependency order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sync_core::{
    Database, EntityKey, EntityKind, FailureKind, Ledger, SubscriptionStatus, SyncState,
};
use sync_remote::{RemoteError, RemoteRecord, RemoteResult};
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::retry::RetryPolicy;
use crate::serialize::{contract_payload, entity_payload};

/// Longest wait before a deferred push is due again.
const MAX_REQUEUE_SECS: i64 = 7 * 24 * 60 * 60;

/// Idempotency key of the create call for `key`. Stable across retries.
pub fn create_idempotency_key(key: EntityKey) -> String {
    format!("create-{}-{}", key.kind, key.local_id)
}

/// Idempotency key of an update sending the version written at `version`.
pub fn update_idempotency_key(key: EntityKey, version: DateTime<Utc>) -> String {
    format!(
        "update-{}-{}-{}",
        key.kind,
        key.local_id,
        version.timestamp_millis()
    )
}

/// Result of pushing one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Not dirty; nothing sent.
    Clean,
    /// Pushes are paused after a conflict.
    Paused,
    /// Tombstoned before it ever reached the remote; pending work dropped.
    Dropped,
    Created { remote_id: String },
    /// An existing remote record with the same merchant code was adopted.
    Adopted { remote_id: String },
    Updated,
    /// A referenced record has no remote id yet. Retried on a later sweep.
    Blocked { missing: Vec<EntityKey> },
    /// Transient failure after in-call retries. Retried on a later sweep.
    Deferred { error: String },
    /// Validation failure; waits for an operator edit.
    Parked { error: String },
    /// The remote record vanished or changed identity; pushes now paused.
    Conflicted { error: String },
}

impl PushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PushOutcome::Created { .. } | PushOutcome::Adopted { .. } | PushOutcome::Updated
        )
    }
}

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub pushed: usize,
    pub clean: usize,
    pub skipped: usize,
    pub blocked: usize,
    pub deferred: usize,
    pub parked: usize,
    pub conflicts: usize,
    pub errors: usize,
    pub cancelled: bool,
}

impl SweepReport {
    fn record(&mut self, key: EntityKey, result: Result<PushOutcome>) {
        self.attempted += 1;
        match result {
            Ok(outcome) if outcome.is_success() => self.pushed += 1,
            Ok(PushOutcome::Clean) => self.clean += 1,
            Ok(PushOutcome::Paused | PushOutcome::Dropped) => self.skipped += 1,
            Ok(PushOutcome::Blocked { .. }) => self.blocked += 1,
            Ok(PushOutcome::Deferred { .. }) => self.deferred += 1,
            Ok(PushOutcome::Parked { .. }) => self.parked += 1,
            Ok(PushOutcome::Conflicted { .. }) => self.conflicts += 1,
            Ok(_) => {}
            Err(e) => {
                warn!(%key, error = %e, "push failed locally");
                self.errors += 1;
            }
        }
    }
}

/// What a push will send, read under the store lock.
enum Prepared {
    Skip(PushOutcome),
    Send {
        payload: Value,
        remote_id: Option<String>,
        code: Option<String>,
        version: DateTime<Utc>,
        draft: bool,
    },
}

enum Sent {
    Created(RemoteRecord),
    Adopted(RemoteRecord),
    Updated,
}

/// Pushes dirty entities to the remote platform.
#[derive(Clone)]
pub struct PushEngine {
    ctx: Context,
    retry: RetryPolicy,
    requeue_delay: Duration,
    workers: usize,
    batch: usize,
    cancel: Arc<AtomicBool>,
}

impl PushEngine {
    pub fn new(ctx: Context, config: &PushConfig) -> Self {
        PushEngine {
            ctx,
            retry: config.retry_policy(),
            requeue_delay: Duration::seconds(
                i64::try_from(config.requeue_delay_secs)
                    .unwrap_or(MAX_REQUEUE_SECS)
                    .min(MAX_REQUEUE_SECS),
            ),
            workers: config.workers.max(1),
            batch: config.batch.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Stop sweeps between work items and stop in-call retries.
    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Push one entity.
    ///
    /// Remote failures are recorded on the ledger and returned as outcomes;
    /// `Err` means the local store failed.
    pub fn push(&self, key: EntityKey) -> Result<PushOutcome> {
        let _guard = self.ctx.locks.lock(&key);
        self.push_locked(key)
    }

    /// Push one entity whose key lock the caller already holds.
    pub(crate) fn push_locked(&self, key: EntityKey) -> Result<PushOutcome> {
        let prepared = {
            let db = self.ctx.store.lock();
            self.prepare(&db, key)?
        };
        let (payload, remote_id, code, version, draft) = match prepared {
            Prepared::Skip(outcome) => {
                debug!(%key, ?outcome, "push skipped");
                return Ok(outcome);
            }
            Prepared::Send {
                payload,
                remote_id,
                code,
                version,
                draft,
            } => (payload, remote_id, code, version, draft),
        };

        let result = self.send(key, &payload, remote_id.as_deref(), code.as_deref(), version);

        let now = self.ctx.now();
        let db = self.ctx.store.lock();
        match result {
            Ok(sent) => {
                let (outcome, assigned) = match sent {
                    Sent::Created(record) => (
                        PushOutcome::Created {
                            remote_id: record.id.clone(),
                        },
                        Some(record.id),
                    ),
                    Sent::Adopted(record) => (
                        PushOutcome::Adopted {
                            remote_id: record.id.clone(),
                        },
                        Some(record.id),
                    ),
                    Sent::Updated => (PushOutcome::Updated, None),
                };
                db.mark_pushed(key, assigned.as_deref(), now)?;
                if draft && assigned.is_some() {
                    db.set_subscription_status(key.local_id, SubscriptionStatus::Active, now)?;
                    info!(%key, "subscription activated");
                }
                info!(%key, ?outcome, "pushed");
                Ok(outcome)
            }
            Err(err) => self.record_failure(&db, key, err, now),
        }
    }

    fn prepare(&self, db: &Database, key: EntityKey) -> Result<Prepared> {
        let state: SyncState = db.sync_state(key)?;
        if !state.dirty {
            db.dequeue_push(key)?;
            return Ok(Prepared::Skip(PushOutcome::Clean));
        }
        if state.push_paused {
            return Ok(Prepared::Skip(PushOutcome::Paused));
        }

        let (payload, code, version, draft) = if key.kind.is_generic() {
            let entity = db.get_entity(key)?;
            if entity.is_deleted() && !state.has_remote_id() {
                db.discard_push(key)?;
                return Ok(Prepared::Skip(PushOutcome::Dropped));
            }
            let payload = entity_payload(db, &entity).map(|mut payload| {
                if let (Some(at), Some(map)) = (entity.deleted_at, payload.as_object_mut()) {
                    map.insert("deleted_at".to_string(), Value::String(at.to_rfc3339()));
                }
                payload
            });
            (payload, entity.code.clone(), entity.updated_at, false)
        } else {
            let contract = db.get_subscription(key.local_id)?;
            if contract.status.is_terminal() && !state.has_remote_id() {
                db.discard_push(key)?;
                return Ok(Prepared::Skip(PushOutcome::Dropped));
            }
            let draft = contract.status == SubscriptionStatus::Draft;
            (contract_payload(db, &contract), None, contract.updated_at, draft)
        };

        match payload {
            Ok(payload) => Ok(Prepared::Send {
                payload,
                remote_id: state.real_remote_id().map(str::to_string),
                code,
                version,
                draft,
            }),
            Err(EngineError::Dependency { missing }) => {
                let err = EngineError::Dependency {
                    missing: missing.clone(),
                };
                let message = err.to_string();
                let now = self.ctx.now();
                db.mark_push_failed(key, FailureKind::Dependency, &message)?;
                db.defer_push(key, now + self.requeue_delay, &message)?;
                warn!(%key, error = %message, "push blocked on dependencies");
                Ok(Prepared::Skip(PushOutcome::Blocked { missing }))
            }
            Err(e) => Err(e),
        }
    }

    fn send(
        &self,
        key: EntityKey,
        payload: &Value,
        remote_id: Option<&str>,
        code: Option<&str>,
        version: DateTime<Utc>,
    ) -> RemoteResult<Sent> {
        let remote = &self.ctx.remote;
        let kind = key.kind;
        let update_key = update_idempotency_key(key, version);

        if let Some(id) = remote_id {
            let (result, _) = self
                .retry
                .run(&self.cancel, || remote.update(kind, id, payload, &update_key));
            return result.map(|_| Sent::Updated);
        }

        if let Some(code) = code {
            let (found, _) = self
                .retry
                .run(&self.cancel, || remote.find_by_code(kind, code));
            if let Some(existing) = found? {
                info!(%key, remote_id = %existing.id, "adopting existing remote record");
                let (result, _) = self.retry.run(&self.cancel, || {
                    remote.update(kind, &existing.id, payload, &update_key)
                });
                return result.map(|_| Sent::Adopted(existing));
            }
        }

        let create_key = create_idempotency_key(key);
        let (result, attempts) = self
            .retry
            .run(&self.cancel, || remote.create(kind, payload, &create_key));
        if attempts > 1 {
            debug!(%key, attempts, "create needed retries");
        }
        result.map(Sent::Created)
    }

    fn record_failure(
        &self,
        db: &Database,
        key: EntityKey,
        err: RemoteError,
        now: DateTime<Utc>,
    ) -> Result<PushOutcome> {
        let message = err.to_string();
        match err {
            RemoteError::Validation(_) => {
                db.mark_push_failed(key, FailureKind::Validation, &message)?;
                db.park_push(key, &message)?;
                warn!(%key, error = %message, "push rejected, parked");
                Ok(PushOutcome::Parked { error: message })
            }
            RemoteError::Conflict(_) => {
                db.mark_push_failed(key, FailureKind::Conflict, &message)?;
                db.park_push(key, &message)?;
                warn!(%key, error = %message, "push conflict, pushes paused");
                Ok(PushOutcome::Conflicted { error: message })
            }
            RemoteError::Transient(_)
            | RemoteError::RateLimited { .. }
            | RemoteError::Unauthorized(_) => {
                db.mark_push_failed(key, FailureKind::Transient, &message)?;
                db.defer_push(key, now + self.requeue_delay, &message)?;
                warn!(%key, error = %message, "push deferred");
                Ok(PushOutcome::Deferred { error: message })
            }
        }
    }

    /// Push every due queue entry.
    pub fn sweep(&self) -> Result<SweepReport> {
        let now = self.ctx.now();
        let items = self.ctx.store.lock().due_pushes(now, self.batch)?;
        let mut report = SweepReport::default();

        for kind in EntityKind::ALL {
            if self.cancelled() {
                report.cancelled = true;
                break;
            }
            let keys: Vec<EntityKey> = items
                .iter()
                .filter(|item| item.key.kind == kind)
                .map(|item| item.key)
                .collect();
            if !keys.is_empty() {
                self.run_wave(&keys, &mut report);
            }
        }
        if self.cancelled() {
            report.cancelled = true;
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                pushed = report.pushed,
                deferred = report.deferred,
                parked = report.parked,
                "push sweep finished"
            );
        }
        Ok(report)
    }

    /// Push `keys` on the worker pool, checking for shutdown between items.
    fn run_wave(&self, keys: &[EntityKey], report: &mut SweepReport) {
        let next = AtomicUsize::new(0);
        let tally = Mutex::new(std::mem::take(report));
        let workers = self.workers.min(keys.len()).max(1);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if self.cancelled() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(key) = keys.get(index) else {
                        break;
                    };
                    let result = self.push(*key);
                    tally.lock().record(*key, result);
                });
            }
        });

        *report = tally.into_inner();
    }

    /// Clear a conflict pause and queue the entity again if it is dirty.
    pub fn resume(&self, key: EntityKey) -> Result<SyncState> {
        let _guard = self.ctx.locks.lock(&key);
        let db = self.ctx.store.lock();
        db.set_push_paused(key, false)?;
        let state = db.sync_state(key)?;
        if state.dirty {
            db.enqueue_push(key, "resume", self.ctx.now())?;
        }
        info!(%key, "pushes resumed");
        Ok(state)
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
