// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync state ledger.
//!
//! One row per syncable record, keyed by [`EntityKey`]. Every write is a
//! single-row idempotent statement; `mark_dirty` and `mark_pushed` also touch
//! the push queue inside the same transaction.
//!
//! Callers own the per-entity lock while writing: exactly one of the local
//! write path, the push engine and webhook ingress touches a row at a time.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::changeset::ChangeSet;
use crate::db::{self, parse_db, parse_json, parse_timestamp_opt, Database};
use crate::entity::{EntityKey, EntityKind, FailureKind, Origin, SyncState, PLACEHOLDER_PREFIX};
use crate::error::{Error, Result};

/// Ledger operations.
pub trait Ledger {
    /// Create the ledger row of a new record. Registering twice is a no-op.
    fn register(
        &self,
        key: EntityKey,
        origin: Origin,
        remote_id: Option<&str>,
    ) -> Result<SyncState>;

    /// Get the ledger row of `key`.
    fn sync_state(&self, key: EntityKey) -> Result<SyncState>;

    /// Get the ledger row of `key`, if registered.
    fn find_sync_state(&self, key: EntityKey) -> Result<Option<SyncState>>;

    /// Map a real remote id back to the local record.
    fn key_for_remote_id(&self, kind: EntityKind, remote_id: &str) -> Result<Option<EntityKey>>;

    /// Record a local change and queue a push.
    ///
    /// Never called for webhook-applied changes.
    fn mark_dirty(
        &self,
        key: EntityKey,
        changes: &ChangeSet,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a successful push: store the remote id (creates only), clear
    /// dirty and the last error, and drop the queue entry.
    fn mark_pushed(
        &self,
        key: EntityKey,
        remote_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Drop pending push work without pushing: clear dirty and the queue
    /// entry. Used for records tombstoned before they reached the remote.
    fn discard_push(&self, key: EntityKey) -> Result<()>;

    /// Record a failed push. Dirty is retained; a conflict pauses pushes.
    fn mark_push_failed(&self, key: EntityKey, kind: FailureKind, error: &str) -> Result<()>;

    /// Record a successful pull.
    fn mark_pulled(&self, key: EntityKey, now: DateTime<Utc>) -> Result<()>;

    /// Pause or resume pushes for `key`.
    fn set_push_paused(&self, key: EntityKey, paused: bool) -> Result<()>;

    /// Rows whose last push failed.
    fn errored_states(&self) -> Result<Vec<SyncState>>;

    /// Keys of every dirty row.
    fn dirty_keys(&self) -> Result<Vec<EntityKey>>;
}

const STATE_COLUMNS: &str = "kind, local_id, remote_id, origin, dirty, dirty_fields, last_error,
     last_error_kind, last_pushed_at, last_pulled_at, push_paused";

fn row_to_state(row: &Row<'_>) -> std::result::Result<SyncState, rusqlite::Error> {
    let kind_str: String = row.get(0)?;
    let origin_str: String = row.get(3)?;
    let fields_str: String = row.get(5)?;
    let error_kind: Option<String> = row.get(7)?;
    let pushed: Option<String> = row.get(8)?;
    let pulled: Option<String> = row.get(9)?;

    let kind: EntityKind = parse_db(&kind_str, "kind")?;
    Ok(SyncState {
        key: EntityKey::new(kind, row.get(1)?),
        remote_id: row.get(2)?,
        origin: parse_db(&origin_str, "origin")?,
        dirty: row.get(4)?,
        dirty_fields: parse_json(&fields_str, "dirty_fields")?,
        last_error: row.get(6)?,
        last_error_kind: error_kind
            .map(|k| parse_db(&k, "last_error_kind"))
            .transpose()?,
        last_pushed_at: parse_timestamp_opt(pushed, "last_pushed_at")?,
        last_pulled_at: parse_timestamp_opt(pulled, "last_pulled_at")?,
        push_paused: row.get(10)?,
    })
}

pub(crate) fn load_state(conn: &Connection, key: EntityKey) -> Result<Option<SyncState>> {
    let sql = format!("SELECT {STATE_COLUMNS} FROM sync_state WHERE kind = ?1 AND local_id = ?2");
    Ok(conn
        .query_row(&sql, params![key.kind.as_str(), key.local_id], row_to_state)
        .optional()?)
}

/// Rewrite the dirty flag and dirty field set of a row.
pub(crate) fn store_dirty(
    conn: &Connection,
    key: EntityKey,
    dirty: bool,
    dirty_fields: &BTreeSet<String>,
) -> Result<()> {
    conn.execute(
        "UPDATE sync_state SET dirty = ?1, dirty_fields = ?2 WHERE kind = ?3 AND local_id = ?4",
        params![
            dirty,
            serde_json::to_string(dirty_fields)?,
            key.kind.as_str(),
            key.local_id
        ],
    )?;
    Ok(())
}

/// Flag `changes` dirty and queue the entity, inside the caller's transaction.
pub(crate) fn mark_dirty_in(
    conn: &Connection,
    key: EntityKey,
    changes: &ChangeSet,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let state = load_state(conn, key)?.ok_or(Error::EntityNotFound(key))?;
    let mut fields = state.dirty_fields;
    fields.extend(changes.field_names());
    store_dirty(conn, key, true, &fields)?;
    db::queue_upsert(conn, key, reason, now)
}

pub(crate) fn touch_pulled(conn: &Connection, key: EntityKey, now: DateTime<Utc>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE sync_state SET last_pulled_at = ?1 WHERE kind = ?2 AND local_id = ?3",
        params![now.to_rfc3339(), key.kind.as_str(), key.local_id],
    )?;
    if changed == 0 {
        return Err(Error::EntityNotFound(key));
    }
    Ok(())
}

impl Ledger for Database {
    fn register(
        &self,
        key: EntityKey,
        origin: Origin,
        remote_id: Option<&str>,
    ) -> Result<SyncState> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sync_state (kind, local_id, remote_id, origin)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.kind.as_str(), key.local_id, remote_id, origin.as_str()],
        )?;
        self.sync_state(key)
    }

    fn sync_state(&self, key: EntityKey) -> Result<SyncState> {
        load_state(&self.conn, key)?.ok_or(Error::EntityNotFound(key))
    }

    fn find_sync_state(&self, key: EntityKey) -> Result<Option<SyncState>> {
        load_state(&self.conn, key)
    }

    fn key_for_remote_id(&self, kind: EntityKind, remote_id: &str) -> Result<Option<EntityKey>> {
        if remote_id.starts_with(PLACEHOLDER_PREFIX) {
            return Ok(None);
        }
        let local_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT local_id FROM sync_state WHERE kind = ?1 AND remote_id = ?2",
                params![kind.as_str(), remote_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(local_id.map(|id| EntityKey::new(kind, id)))
    }

    fn mark_dirty(
        &self,
        key: EntityKey,
        changes: &ChangeSet,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        mark_dirty_in(&tx, key, changes, reason, now)?;
        tx.commit()?;
        Ok(())
    }

    fn mark_pushed(
        &self,
        key: EntityKey,
        remote_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE sync_state SET
                 remote_id = COALESCE(?1, remote_id),
                 dirty = 0,
                 dirty_fields = '[]',
                 last_error = NULL,
                 last_error_kind = NULL,
                 last_pushed_at = ?2
             WHERE kind = ?3 AND local_id = ?4",
            params![remote_id, now.to_rfc3339(), key.kind.as_str(), key.local_id],
        )?;
        if changed == 0 {
            return Err(Error::EntityNotFound(key));
        }
        db::queue_remove(&tx, key)?;
        tx.commit()?;
        Ok(())
    }

    fn discard_push(&self, key: EntityKey) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if load_state(&tx, key)?.is_none() {
            return Err(Error::EntityNotFound(key));
        }
        store_dirty(&tx, key, false, &BTreeSet::new())?;
        db::queue_remove(&tx, key)?;
        tx.commit()?;
        Ok(())
    }

    fn mark_push_failed(&self, key: EntityKey, kind: FailureKind, error: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sync_state SET last_error = ?1, last_error_kind = ?2,
                 push_paused = CASE WHEN ?2 = 'conflict' THEN 1 ELSE push_paused END
             WHERE kind = ?3 AND local_id = ?4",
            params![error, kind.as_str(), key.kind.as_str(), key.local_id],
        )?;
        if changed == 0 {
            return Err(Error::EntityNotFound(key));
        }
        Ok(())
    }

    fn mark_pulled(&self, key: EntityKey, now: DateTime<Utc>) -> Result<()> {
        touch_pulled(&self.conn, key, now)
    }

    fn set_push_paused(&self, key: EntityKey, paused: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sync_state SET push_paused = ?1 WHERE kind = ?2 AND local_id = ?3",
            params![paused, key.kind.as_str(), key.local_id],
        )?;
        if changed == 0 {
            return Err(Error::EntityNotFound(key));
        }
        Ok(())
    }

    fn errored_states(&self) -> Result<Vec<SyncState>> {
        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM sync_state WHERE last_error IS NOT NULL
             ORDER BY kind, local_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let states = stmt
            .query_map([], row_to_state)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }

    fn dirty_keys(&self) -> Result<Vec<EntityKey>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, local_id FROM sync_state WHERE dirty = 1 ORDER BY kind, local_id")?;
        let keys = stmt
            .query_map([], |row| {
                let kind_str: String = row.get(0)?;
                let kind: EntityKind = parse_db(&kind_str, "kind")?;
                Ok(EntityKey::new(kind, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
