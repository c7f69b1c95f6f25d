// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound webhook event log.
//!
//! Verified events are recorded by event id. The log answers duplicate
//! deliveries and keeps deferred payloads for replay. Events that fail
//! verification never reach it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{parse_db, parse_timestamp, Database};
use crate::error::{Error, Result};

/// Outcome of a verified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookState {
    Applied,
    /// Waiting for the referenced entity to become known locally.
    Deferred,
    /// Gave up after too many deferrals.
    Orphaned,
    /// Verified but not relevant (unknown topic, stale, tombstoned target).
    Ignored,
}

impl WebhookState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookState::Applied => "applied",
            WebhookState::Deferred => "deferred",
            WebhookState::Orphaned => "orphaned",
            WebhookState::Ignored => "ignored",
        }
    }
}

impl fmt::Display for WebhookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WebhookState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "applied" => Ok(WebhookState::Applied),
            "deferred" => Ok(WebhookState::Deferred),
            "orphaned" => Ok(WebhookState::Orphaned),
            "ignored" => Ok(WebhookState::Ignored),
            _ => Err(Error::InvalidRecordStatus {
                kind: "webhook event",
                value: s.to_string(),
            }),
        }
    }
}

/// A logged webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: String,
    pub topic: String,
    pub remote_id: String,
    pub occurred_at: DateTime<Utc>,
    /// Raw verified body, replayed for deferred events.
    pub payload: String,
    pub state: WebhookState,
    pub deferrals: u32,
    pub detail: Option<String>,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const EVENT_COLUMNS: &str = "event_id, topic, remote_id, occurred_at, payload, state, deferrals,
     detail, received_at, updated_at";

fn row_to_event(row: &Row<'_>) -> std::result::Result<StoredEvent, rusqlite::Error> {
    let occurred_str: String = row.get(3)?;
    let state_str: String = row.get(5)?;
    let received_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(StoredEvent {
        event_id: row.get(0)?,
        topic: row.get(1)?,
        remote_id: row.get(2)?,
        occurred_at: parse_timestamp(&occurred_str, "occurred_at")?,
        payload: row.get(4)?,
        state: parse_db(&state_str, "state")?,
        deferrals: row.get(6)?,
        detail: row.get(7)?,
        received_at: parse_timestamp(&received_str, "received_at")?,
        updated_at: parse_timestamp(&updated_str, "updated_at")?,
    })
}

impl Database {
    /// Look up a logged event by id.
    pub fn get_webhook_event(&self, event_id: &str) -> Result<Option<StoredEvent>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM webhook_events WHERE event_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![event_id], row_to_event)
            .optional()?)
    }

    /// Record an event outcome, replacing any earlier row for the same id.
    pub fn record_webhook_event(&self, event: &StoredEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO webhook_events (event_id, topic, remote_id, occurred_at, payload, state,
                 deferrals, detail, received_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(event_id) DO UPDATE SET
                 state = excluded.state,
                 deferrals = excluded.deferrals,
                 detail = excluded.detail,
                 updated_at = excluded.updated_at",
            params![
                event.event_id,
                event.topic,
                event.remote_id,
                event.occurred_at.to_rfc3339(),
                event.payload,
                event.state.as_str(),
                event.deferrals,
                event.detail,
                event.received_at.to_rfc3339(),
                event.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Events waiting for replay, in arrival order.
    pub fn deferred_webhook_events(&self) -> Result<Vec<StoredEvent>> {
        self.webhook_events_in_state(WebhookState::Deferred)
    }

    /// Events in `state`, in arrival order.
    pub fn webhook_events_in_state(&self, state: WebhookState) -> Result<Vec<StoredEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE state = ?1
             ORDER BY received_at, occurred_at"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let events = stmt
            .query_map(params![state.as_str()], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Event counts per state.
    pub fn webhook_event_counts(&self) -> Result<Vec<(WebhookState, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM webhook_events GROUP BY state ORDER BY state")?;
        let counts = stmt
            .query_map([], |row| {
                let state_str: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_db(&state_str, "state")?, count as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

#[cfg(test)]
#[path = "webhooks_tests.rs"]
mod tests;
