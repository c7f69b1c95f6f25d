// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed local datastore.
//!
//! The [`Database`] struct owns the connection. Data access is split by
//! concern into submodules that each add an `impl Database` block:
//! entities, the push queue, subscriptions, skips, billing attempts and the
//! webhook event log. Ledger and merge operations live in
//! [`crate::ledger`] and [`crate::merge`].

mod billing;
mod entities;
mod queue;
mod skips;
mod subscriptions;
mod webhooks;

pub use billing::BillingSettlement;
pub use queue::{QueueItem, QueueState, QueueStats};
pub(crate) use entities::{load_entity, store_fields};
pub(crate) use queue::{remove as queue_remove, upsert as queue_upsert};
pub(crate) use subscriptions::{load_subscription, store_contract_state, store_dates};
pub use webhooks::{StoredEvent, WebhookState};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::{Error, Result};

/// SQL schema for the local datastore.
pub const SCHEMA: &str = r#"
-- Customer, catalog and inventory records (generic field storage)
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    code TEXT,
    fields TEXT NOT NULL DEFAULT '{}',
    field_times TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

-- Sync ledger, one row per syncable record
CREATE TABLE IF NOT EXISTS sync_state (
    kind TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    remote_id TEXT,
    origin TEXT NOT NULL,
    dirty INTEGER NOT NULL DEFAULT 0,
    dirty_fields TEXT NOT NULL DEFAULT '[]',
    last_error TEXT,
    last_error_kind TEXT,
    last_pushed_at TEXT,
    last_pulled_at TEXT,
    push_paused INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (kind, local_id)
);

-- Durable push work queue
CREATE TABLE IF NOT EXISTS push_queue (
    kind TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    reason TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'ready',   -- ready|parked
    attempts INTEGER NOT NULL DEFAULT 0,
    enqueued_at TEXT NOT NULL,
    not_before TEXT,
    last_error TEXT,
    PRIMARY KEY (kind, local_id)
);

-- Subscription contracts
CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER NOT NULL,
    selling_plan_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    next_billing_at TEXT NOT NULL,
    next_delivery_at TEXT NOT NULL,
    billing_anchor_at TEXT,
    delivery_anchor_at TEXT,
    billing_interval TEXT NOT NULL,
    delivery_address_id INTEGER NOT NULL,
    payment_method_ref TEXT,
    field_times TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscription_lines (
    subscription_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    variant_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    unit_price_cents INTEGER NOT NULL,
    PRIMARY KEY (subscription_id, position),
    FOREIGN KEY (subscription_id) REFERENCES subscriptions(id)
);

-- Skip audit trail (append-only)
CREATE TABLE IF NOT EXISTS skip_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscription_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    original_billing_at TEXT NOT NULL,
    new_billing_at TEXT NOT NULL,
    new_delivery_at TEXT NOT NULL,
    reason TEXT,
    fee_cents INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    confirmed_at TEXT,
    FOREIGN KEY (subscription_id) REFERENCES subscriptions(id)
);

-- Billing attempts (append-only)
CREATE TABLE IF NOT EXISTS billing_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscription_id INTEGER NOT NULL,
    cycle_at TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    status TEXT NOT NULL,
    remote_order_ref TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    FOREIGN KEY (subscription_id) REFERENCES subscriptions(id)
);

-- Inbound webhook log
CREATE TABLE IF NOT EXISTS webhook_events (
    event_id TEXT PRIMARY KEY,
    topic TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    payload TEXT NOT NULL,
    state TEXT NOT NULL,
    deferrals INTEGER NOT NULL DEFAULT 0,
    detail TEXT,
    received_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);
CREATE INDEX IF NOT EXISTS idx_entities_code ON entities(kind, code);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_state_remote ON sync_state(kind, remote_id)
    WHERE remote_id IS NOT NULL AND substr(remote_id, 1, 5) != 'temp_';
CREATE INDEX IF NOT EXISTS idx_sync_state_dirty ON sync_state(dirty);
CREATE INDEX IF NOT EXISTS idx_push_queue_ready ON push_queue(state, not_before);
CREATE INDEX IF NOT EXISTS idx_subscriptions_due ON subscriptions(status, next_billing_at);
CREATE INDEX IF NOT EXISTS idx_skip_records_sub ON skip_records(subscription_id);
CREATE INDEX IF NOT EXISTS idx_attempts_sub ON billing_attempts(subscription_id);
-- At most one live (pending or successful) attempt per billing cycle
CREATE UNIQUE INDEX IF NOT EXISTS idx_attempts_live_key ON billing_attempts(idempotency_key)
    WHERE status != 'failed';
CREATE INDEX IF NOT EXISTS idx_webhook_events_state ON webhook_events(state);
"#;

/// Parse a string value from the database, returning a rusqlite error on parse failure.
pub(crate) fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!(
                "invalid value '{value}' in column '{column}'"
            ))),
        )
    })
}

/// Parse an RFC3339 timestamp from the database.
pub(crate) fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Parse an optional RFC3339 timestamp from the database.
pub(crate) fn parse_timestamp_opt(
    value: Option<String>,
    column: &str,
) -> std::result::Result<Option<DateTime<Utc>>, rusqlite::Error> {
    value.map(|v| parse_timestamp(&v, column)).transpose()
}

/// Parse a JSON column from the database.
pub(crate) fn parse_json<T: DeserializeOwned>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    serde_json::from_str(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!(
                "invalid JSON in column '{column}'"
            ))),
        )
    })
}

/// Run schema creation on a database connection.
///
/// All statements are idempotent, so this is safe on every open.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    migrate_add_cycle_anchors(conn)?;
    Ok(())
}

/// Migration: Add the cycle anchor columns to existing contract tables.
///
/// Contracts stored before the anchors existed are anchored on their current
/// dates.
fn migrate_add_cycle_anchors(conn: &Connection) -> Result<()> {
    for column in ["billing_anchor_at", "delivery_anchor_at"] {
        let has_column: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('subscriptions') WHERE name = ?1",
            [column],
            |row| row.get(0),
        )?;
        if !has_column {
            conn.execute(&format!("ALTER TABLE subscriptions ADD COLUMN {column} TEXT"), [])?;
        }
    }
    conn.execute(
        "UPDATE subscriptions SET billing_anchor_at = next_billing_at
         WHERE billing_anchor_at IS NULL",
        [],
    )?;
    conn.execute(
        "UPDATE subscriptions SET delivery_anchor_at = next_delivery_at
         WHERE delivery_anchor_at IS NULL",
        [],
    )?;
    Ok(())
}

/// SQLite database connection with datastore operations.
pub struct Database {
    /// The underlying SQLite connection.
    pub conn: Connection,
}

impl Database {
    /// Open a database connection at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets the daemon and CLI share the file
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let db = Database { conn };
        run_migrations(&db.conn)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database { conn };
        run_migrations(&db.conn)?;
        Ok(db)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
