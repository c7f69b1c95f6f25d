// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local write path for customer, catalog and inventory records.
//!
//! Every write holds the entity's key lock, applies an explicit change set
//! and marks exactly the written fields dirty. With `push_on_save` the write
//! is followed by an immediate push; otherwise the queue entry waits for the
//! next sweep.

use sync_core::{placeholder_remote_id, ChangeSet, Entity, EntityKey, EntityKind, Ledger, Origin};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Result;
use crate::push::{PushEngine, PushOutcome};

#[derive(Clone)]
pub struct LocalWriter {
    ctx: Context,
    push: PushEngine,
    push_on_save: bool,
}

impl LocalWriter {
    pub fn new(ctx: Context, push: PushEngine) -> Self {
        LocalWriter {
            ctx,
            push,
            push_on_save: false,
        }
    }

    /// Push synchronously after each write.
    pub fn push_on_save(mut self, enabled: bool) -> Self {
        self.push_on_save = enabled;
        self
    }

    /// Create a record with a placeholder remote id and queue its create.
    pub fn create(
        &self,
        kind: EntityKind,
        code: Option<&str>,
        fields: ChangeSet,
    ) -> Result<Entity> {
        let now = self.ctx.now();
        let entity = {
            let db = self.ctx.store.lock();
            // A fresh key is invisible to the queue and webhooks until marked.
            let entity = db.insert_entity(kind, code, &fields, now)?;
            db.register(entity.key, Origin::LocalCreated, Some(&placeholder_remote_id(now)))?;
            db.mark_dirty(entity.key, &fields, "create", now)?;
            entity
        };
        debug!(key = %entity.key, "created locally");
        self.after_save(entity.key);
        Ok(entity)
    }

    /// Apply `changes`; fields whose value does not change are not marked.
    ///
    /// Returns the change set actually applied.
    pub fn update(&self, key: EntityKey, changes: ChangeSet) -> Result<ChangeSet> {
        let applied = {
            let _guard = self.ctx.locks.lock(&key);
            let db = self.ctx.store.lock();
            let now = self.ctx.now();
            let applied = db.update_entity_fields(key, changes, now)?;
            if !applied.is_empty() {
                db.mark_dirty(key, &applied, "update", now)?;
            }
            applied
        };
        if !applied.is_empty() {
            self.after_save(key);
        }
        Ok(applied)
    }

    /// Tombstone a record.
    ///
    /// A record that never reached the remote just drops its pending create;
    /// otherwise the tombstone is pushed as an update carrying `deleted_at`.
    pub fn delete(&self, key: EntityKey) -> Result<bool> {
        let needs_push = {
            let _guard = self.ctx.locks.lock(&key);
            let db = self.ctx.store.lock();
            let now = self.ctx.now();
            if !db.tombstone_entity(key, now)? {
                return Ok(false);
            }
            if db.sync_state(key)?.has_remote_id() {
                let changes = ChangeSet::new().set("deleted_at", now.to_rfc3339());
                db.mark_dirty(key, &changes, "delete", now)?;
                true
            } else {
                db.discard_push(key)?;
                false
            }
        };
        if needs_push {
            self.after_save(key);
        }
        Ok(true)
    }

    fn after_save(&self, key: EntityKey) {
        if !self.push_on_save {
            return;
        }
        match self.push.push(key) {
            Ok(outcome) if outcome.is_success() => {}
            Ok(PushOutcome::Clean) => {}
            Ok(outcome) => debug!(%key, ?outcome, "push on save did not complete"),
            Err(e) => warn!(%key, error = %e, "push on save failed"),
        }
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
