// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_db, parse_timestamp, parse_timestamp_opt, store_dates, Database};
use crate::entity::EntityKey;
use crate::error::{Error, Result};
use crate::ledger::mark_dirty_in;
use crate::subscription::{cycle_changes, SkipRecord, SkipStatus};

const SKIP_COLUMNS: &str = "id, subscription_id, status, original_billing_at, new_billing_at,
     new_delivery_at, reason, fee_cents, created_at, confirmed_at";

fn row_to_skip(row: &Row<'_>) -> std::result::Result<SkipRecord, rusqlite::Error> {
    let status_str: String = row.get(2)?;
    let original_str: String = row.get(3)?;
    let billing_str: String = row.get(4)?;
    let delivery_str: String = row.get(5)?;
    let created_str: String = row.get(8)?;
    let confirmed_str: Option<String> = row.get(9)?;

    Ok(SkipRecord {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        status: parse_db(&status_str, "status")?,
        original_billing_at: parse_timestamp(&original_str, "original_billing_at")?,
        new_billing_at: parse_timestamp(&billing_str, "new_billing_at")?,
        new_delivery_at: parse_timestamp(&delivery_str, "new_delivery_at")?,
        reason: row.get(6)?,
        fee_cents: row.get(7)?,
        created_at: parse_timestamp(&created_str, "created_at")?,
        confirmed_at: parse_timestamp_opt(confirmed_str, "confirmed_at")?,
    })
}

fn load_skip(conn: &Connection, id: i64) -> Result<Option<SkipRecord>> {
    let sql = format!("SELECT {SKIP_COLUMNS} FROM skip_records WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_skip).optional()?)
}

#[allow(clippy::too_many_arguments)]
fn insert_skip_in(
    conn: &Connection,
    subscription_id: i64,
    original_billing_at: DateTime<Utc>,
    new_billing_at: DateTime<Utc>,
    new_delivery_at: DateTime<Utc>,
    reason: Option<&str>,
    fee_cents: i64,
    now: DateTime<Utc>,
) -> Result<SkipRecord> {
    conn.execute(
        "INSERT INTO skip_records (subscription_id, status, original_billing_at,
             new_billing_at, new_delivery_at, reason, fee_cents, created_at)
         VALUES (?1, 'pending', ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            subscription_id,
            original_billing_at.to_rfc3339(),
            new_billing_at.to_rfc3339(),
            new_delivery_at.to_rfc3339(),
            reason,
            fee_cents,
            now.to_rfc3339(),
        ],
    )?;
    Ok(SkipRecord {
        id: conn.last_insert_rowid(),
        subscription_id,
        status: SkipStatus::Pending,
        original_billing_at,
        new_billing_at,
        new_delivery_at,
        reason: reason.map(str::to_string),
        fee_cents,
        created_at: now,
        confirmed_at: None,
    })
}

fn settle_skip_in(
    conn: &Connection,
    id: i64,
    status: SkipStatus,
    at: DateTime<Utc>,
) -> Result<SkipRecord> {
    if !status.is_terminal() {
        return Err(Error::InvalidRecordStatus {
            kind: "skip",
            value: status.to_string(),
        });
    }
    let confirmed_at = (status == SkipStatus::Confirmed).then(|| at.to_rfc3339());
    let changed = conn.execute(
        "UPDATE skip_records SET status = ?1, confirmed_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![status.as_str(), confirmed_at, id],
    )?;
    let record = load_skip(conn, id)?
        .ok_or_else(|| Error::CorruptedData(format!("skip record {id} not found")))?;
    if changed == 0 {
        return Err(Error::InvalidRecordStatus {
            kind: "skip",
            value: record.status.to_string(),
        });
    }
    Ok(record)
}

impl Database {
    /// Record a pending skip of the cycle billed at `original_billing_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_skip(
        &self,
        subscription_id: i64,
        original_billing_at: DateTime<Utc>,
        new_billing_at: DateTime<Utc>,
        new_delivery_at: DateTime<Utc>,
        reason: Option<&str>,
        fee_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<SkipRecord> {
        insert_skip_in(
            &self.conn,
            subscription_id,
            original_billing_at,
            new_billing_at,
            new_delivery_at,
            reason,
            fee_cents,
            now,
        )
    }

    /// Move a pending skip to a terminal status.
    ///
    /// Terminal records are never touched again; settling one twice is an error.
    pub fn settle_skip(&self, id: i64, status: SkipStatus, at: DateTime<Utc>) -> Result<SkipRecord> {
        settle_skip_in(&self.conn, id, status, at)
    }

    /// Record, confirm and apply a skip in one transaction.
    ///
    /// The skip record, the new contract dates and the dirty mark commit
    /// together or not at all.
    #[allow(clippy::too_many_arguments)]
    pub fn confirm_skip(
        &self,
        subscription_id: i64,
        original_billing_at: DateTime<Utc>,
        new_billing_at: DateTime<Utc>,
        new_delivery_at: DateTime<Utc>,
        reason: Option<&str>,
        fee_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<SkipRecord> {
        let tx = self.conn.unchecked_transaction()?;
        let pending = insert_skip_in(
            &tx,
            subscription_id,
            original_billing_at,
            new_billing_at,
            new_delivery_at,
            reason,
            fee_cents,
            now,
        )?;
        let confirmed = settle_skip_in(&tx, pending.id, SkipStatus::Confirmed, now)?;
        store_dates(&tx, subscription_id, new_billing_at, new_delivery_at, now)?;
        mark_dirty_in(
            &tx,
            EntityKey::contract(subscription_id),
            &cycle_changes(new_billing_at, new_delivery_at),
            "skip",
            now,
        )?;
        tx.commit()?;
        Ok(confirmed)
    }

    /// Skip records of a contract, oldest first.
    pub fn list_skips(&self, subscription_id: i64) -> Result<Vec<SkipRecord>> {
        let sql = format!(
            "SELECT {SKIP_COLUMNS} FROM skip_records WHERE subscription_id = ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let skips = stmt
            .query_map(params![subscription_id], row_to_skip)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(skips)
    }

    /// Confirmed skips whose skipped billing date falls in calendar `year`.
    pub fn confirmed_skips_in_year(&self, subscription_id: i64, year: i32) -> Result<usize> {
        Ok(self
            .list_skips(subscription_id)?
            .iter()
            .filter(|s| s.status == SkipStatus::Confirmed && s.original_billing_at.year() == year)
            .count())
    }

    /// Confirmed skips created after `since`, or all of them when `since` is None.
    pub fn confirmed_skips_since(
        &self,
        subscription_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        Ok(self
            .list_skips(subscription_id)?
            .iter()
            .filter(|s| s.status == SkipStatus::Confirmed)
            .filter(|s| since.is_none_or(|at| s.created_at > at))
            .count())
    }
}

#[cfg(test)]
#[path = "skips_tests.rs"]
mod tests;
