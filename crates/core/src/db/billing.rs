// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    load_subscription, parse_db, parse_timestamp, parse_timestamp_opt, store_dates, Database,
};
use crate::entity::EntityKey;
use crate::error::{Error, Result};
use crate::ledger::mark_dirty_in;
use crate::subscription::{cycle_changes, AttemptStatus, BillingAttempt};

/// A successful attempt and the dates the contract moved to, if it moved.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingSettlement {
    pub attempt: BillingAttempt,
    pub advanced_to: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

const ATTEMPT_COLUMNS: &str = "id, subscription_id, cycle_at, idempotency_key, status,
     remote_order_ref, error, created_at, completed_at";

fn row_to_attempt(row: &Row<'_>) -> std::result::Result<BillingAttempt, rusqlite::Error> {
    let cycle_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(7)?;
    let completed_str: Option<String> = row.get(8)?;

    Ok(BillingAttempt {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        cycle_at: parse_timestamp(&cycle_str, "cycle_at")?,
        idempotency_key: row.get(3)?,
        status: parse_db(&status_str, "status")?,
        remote_order_ref: row.get(5)?,
        error: row.get(6)?,
        created_at: parse_timestamp(&created_str, "created_at")?,
        completed_at: parse_timestamp_opt(completed_str, "completed_at")?,
    })
}

fn load_attempt(conn: &Connection, id: i64) -> Result<Option<BillingAttempt>> {
    let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM billing_attempts WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_attempt).optional()?)
}

fn complete_attempt_in(
    conn: &Connection,
    id: i64,
    status: AttemptStatus,
    remote_order_ref: Option<&str>,
    error: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Option<BillingAttempt>> {
    if !status.is_terminal() {
        return Err(Error::InvalidRecordStatus {
            kind: "billing attempt",
            value: status.to_string(),
        });
    }
    let changed = conn.execute(
        "UPDATE billing_attempts SET status = ?1, remote_order_ref = ?2, error = ?3,
             completed_at = ?4
         WHERE id = ?5 AND status = 'pending'",
        params![status.as_str(), remote_order_ref, error, at.to_rfc3339(), id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    load_attempt(conn, id)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl Database {
    /// Insert a PENDING attempt for a billing cycle.
    ///
    /// Returns None when a pending or successful attempt already holds the
    /// key; the partial unique index decides, not the caller.
    pub fn insert_billing_attempt(
        &self,
        subscription_id: i64,
        cycle_at: DateTime<Utc>,
        idempotency_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BillingAttempt>> {
        let inserted = self.conn.execute(
            "INSERT INTO billing_attempts (subscription_id, cycle_at, idempotency_key, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            params![
                subscription_id,
                cycle_at.to_rfc3339(),
                idempotency_key,
                now.to_rfc3339()
            ],
        );
        match inserted {
            Ok(_) => Ok(Some(BillingAttempt {
                id: self.conn.last_insert_rowid(),
                subscription_id,
                cycle_at,
                idempotency_key: idempotency_key.to_string(),
                status: AttemptStatus::Pending,
                remote_order_ref: None,
                error: None,
                created_at: now,
                completed_at: None,
            })),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Settle a PENDING attempt as SUCCESS or FAILED.
    ///
    /// Returns None if the attempt was already terminal.
    pub fn complete_billing_attempt(
        &self,
        id: i64,
        status: AttemptStatus,
        remote_order_ref: Option<&str>,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<BillingAttempt>> {
        complete_attempt_in(&self.conn, id, status, remote_order_ref, error, at)
    }

    /// Settle a PENDING attempt as SUCCESS and, if the contract still bills
    /// on the attempt's cycle, advance its dates, in one transaction.
    ///
    /// Returns None if the attempt was already terminal.
    pub fn record_billing_success(
        &self,
        id: i64,
        remote_order_ref: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<BillingSettlement>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(attempt) =
            complete_attempt_in(&tx, id, AttemptStatus::Success, remote_order_ref, None, at)?
        else {
            return Ok(None);
        };
        let contract = load_subscription(&tx, attempt.subscription_id)?
            .ok_or(Error::SubscriptionNotFound(attempt.subscription_id))?;
        let advanced_to = if contract.next_billing_at == attempt.cycle_at {
            let (next_billing, next_delivery) = contract.next_cycle_dates()?;
            store_dates(&tx, contract.id, next_billing, next_delivery, at)?;
            mark_dirty_in(
                &tx,
                EntityKey::contract(contract.id),
                &cycle_changes(next_billing, next_delivery),
                "billing",
                at,
            )?;
            Some((next_billing, next_delivery))
        } else {
            None
        };
        tx.commit()?;
        Ok(Some(BillingSettlement {
            attempt,
            advanced_to,
        }))
    }

    /// A billing attempt by id.
    pub fn billing_attempt(&self, id: i64) -> Result<BillingAttempt> {
        load_attempt(&self.conn, id)?
            .ok_or_else(|| Error::CorruptedData(format!("billing attempt {id} not found")))
    }

    /// The pending or successful attempt holding `idempotency_key`, if any.
    pub fn live_billing_attempt(&self, idempotency_key: &str) -> Result<Option<BillingAttempt>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM billing_attempts
             WHERE idempotency_key = ?1 AND status != 'failed'"
        );
        Ok(self
            .conn
            .query_row(&sql, params![idempotency_key], row_to_attempt)
            .optional()?)
    }

    /// Attempts of a contract, oldest first.
    pub fn list_billing_attempts(&self, subscription_id: i64) -> Result<Vec<BillingAttempt>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM billing_attempts WHERE subscription_id = ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let attempts = stmt
            .query_map(params![subscription_id], row_to_attempt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    /// Pending attempts across all contracts, oldest first.
    pub fn pending_billing_attempts(&self) -> Result<Vec<BillingAttempt>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM billing_attempts WHERE status = 'pending' ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let attempts = stmt
            .query_map([], row_to_attempt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    /// The most recent successful attempt of a contract.
    pub fn last_successful_attempt(&self, subscription_id: i64) -> Result<Option<BillingAttempt>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM billing_attempts
             WHERE subscription_id = ?1 AND status = 'success'
             ORDER BY id DESC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![subscription_id], row_to_attempt)
            .optional()?)
    }

    /// Failed attempts for one cycle key.
    pub fn failed_attempts_for_key(&self, idempotency_key: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM billing_attempts WHERE idempotency_key = ?1 AND status = 'failed'",
            params![idempotency_key],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Failed attempts since the last successful one.
    pub fn consecutive_billing_failures(&self, subscription_id: i64) -> Result<usize> {
        let last_success = self
            .last_successful_attempt(subscription_id)?
            .map(|a| a.id)
            .unwrap_or(0);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM billing_attempts
             WHERE subscription_id = ?1 AND status = 'failed' AND id > ?2",
            params![subscription_id, last_success],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
#[path = "billing_tests.rs"]
mod tests;
