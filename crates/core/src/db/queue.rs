// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable push work queue.
//!
//! One row per entity with pending push work. Re-enqueueing an entity that
//! is already queued refreshes its reason and readies it again, so the queue
//! never holds duplicates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{parse_db, parse_timestamp, parse_timestamp_opt, Database};
use crate::entity::{EntityKey, EntityKind};
use crate::error::{Error, Result};

/// State of a queued push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Eligible once `not_before` has passed.
    Ready,
    /// Waiting for an operator after a validation failure.
    Parked,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Ready => "ready",
            QueueState::Parked => "parked",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ready" => Ok(QueueState::Ready),
            "parked" => Ok(QueueState::Parked),
            _ => Err(Error::InvalidQueueState(s.to_string())),
        }
    }
}

/// A queued push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub key: EntityKey,
    pub reason: String,
    pub state: QueueState,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Returns true if a sweep at `now` should pick this item up.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == QueueState::Ready && self.not_before.is_none_or(|nb| nb <= now)
    }
}

/// Backlog counts for operator views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Ready and due now.
    pub due: usize,
    /// Ready but backing off.
    pub deferred: usize,
    pub parked: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.due + self.deferred + self.parked
    }
}

const QUEUE_COLUMNS: &str =
    "kind, local_id, reason, state, attempts, enqueued_at, not_before, last_error";

fn row_to_item(row: &Row<'_>) -> std::result::Result<QueueItem, rusqlite::Error> {
    let kind_str: String = row.get(0)?;
    let state_str: String = row.get(3)?;
    let enqueued_str: String = row.get(5)?;
    let not_before: Option<String> = row.get(6)?;

    let kind: EntityKind = parse_db(&kind_str, "kind")?;
    Ok(QueueItem {
        key: EntityKey::new(kind, row.get(1)?),
        reason: row.get(2)?,
        state: parse_db(&state_str, "state")?,
        attempts: row.get(4)?,
        enqueued_at: parse_timestamp(&enqueued_str, "enqueued_at")?,
        not_before: parse_timestamp_opt(not_before, "not_before")?,
        last_error: row.get(7)?,
    })
}

/// Upsert an entity into the queue, readying parked or deferred entries.
pub(crate) fn upsert(
    conn: &Connection,
    key: EntityKey,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO push_queue (kind, local_id, reason, state, attempts, enqueued_at)
         VALUES (?1, ?2, ?3, 'ready', 0, ?4)
         ON CONFLICT(kind, local_id) DO UPDATE SET
             reason = excluded.reason,
             state = 'ready',
             not_before = NULL",
        params![key.kind.as_str(), key.local_id, reason, now.to_rfc3339()],
    )?;
    Ok(())
}

pub(crate) fn remove(conn: &Connection, key: EntityKey) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM push_queue WHERE kind = ?1 AND local_id = ?2",
        params![key.kind.as_str(), key.local_id],
    )?;
    Ok(removed > 0)
}

impl Database {
    /// Queue a push for `key`.
    pub fn enqueue_push(&self, key: EntityKey, reason: &str, now: DateTime<Utc>) -> Result<()> {
        upsert(&self.conn, key, reason, now)
    }

    /// Remove the queue entry of `key`. Returns false if none existed.
    pub fn dequeue_push(&self, key: EntityKey) -> Result<bool> {
        remove(&self.conn, key)
    }

    /// Get the queue entry of `key`, if any.
    pub fn queue_item(&self, key: EntityKey) -> Result<Option<QueueItem>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM push_queue WHERE kind = ?1 AND local_id = ?2");
        let item = self
            .conn
            .query_row(&sql, params![key.kind.as_str(), key.local_id], row_to_item)
            .optional()?;
        Ok(item)
    }

    /// All queue entries, oldest first.
    pub fn list_queue(&self) -> Result<Vec<QueueItem>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM push_queue ORDER BY enqueued_at, kind, local_id");
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map([], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Entries a sweep at `now` should push, parents before children.
    pub fn due_pushes(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueueItem>> {
        let mut due: Vec<QueueItem> = self
            .list_queue()?
            .into_iter()
            .filter(|item| item.is_due(now))
            .collect();
        due.sort_by_key(|item| {
            let rank = EntityKind::ALL
                .iter()
                .position(|k| *k == item.key.kind)
                .unwrap_or(EntityKind::ALL.len());
            (rank, item.enqueued_at)
        });
        due.truncate(limit);
        Ok(due)
    }

    /// Record a failed attempt and hold the entry until `not_before`.
    pub fn defer_push(
        &self,
        key: EntityKey,
        not_before: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE push_queue SET attempts = attempts + 1, not_before = ?1, last_error = ?2
             WHERE kind = ?3 AND local_id = ?4",
            params![not_before.to_rfc3339(), error, key.kind.as_str(), key.local_id],
        )?;
        Ok(())
    }

    /// Park the entry until an operator intervenes.
    pub fn park_push(&self, key: EntityKey, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE push_queue SET state = 'parked', attempts = attempts + 1, last_error = ?1
             WHERE kind = ?2 AND local_id = ?3",
            params![error, key.kind.as_str(), key.local_id],
        )?;
        Ok(())
    }

    /// Backlog counts at `now`.
    pub fn queue_stats(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        for item in self.list_queue()? {
            match item.state {
                QueueState::Parked => stats.parked += 1,
                QueueState::Ready if item.is_due(now) => stats.due += 1,
                QueueState::Ready => stats.deferred += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
