// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_db, parse_json, parse_timestamp, parse_timestamp_opt, Database};
use crate::error::{Error, Result};
use crate::subscription::{
    LineItem, NewSubscription, SubscriptionContract, SubscriptionStatus, CONTRACT_FIELD_NEXT_BILLING,
    CONTRACT_FIELD_NEXT_DELIVERY, CONTRACT_FIELD_STATUS,
};

const SUBSCRIPTION_COLUMNS: &str = "id, customer_id, selling_plan_id, status, next_billing_at,
     next_delivery_at, billing_interval, delivery_address_id, payment_method_ref,
     field_times, created_at, updated_at, billing_anchor_at, delivery_anchor_at";

fn row_to_contract(row: &Row<'_>) -> std::result::Result<SubscriptionContract, rusqlite::Error> {
    let status_str: String = row.get(3)?;
    let billing_str: String = row.get(4)?;
    let delivery_str: String = row.get(5)?;
    let interval_str: String = row.get(6)?;
    let times_str: String = row.get(9)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;
    let billing_anchor: Option<String> = row.get(12)?;
    let delivery_anchor: Option<String> = row.get(13)?;
    let next_billing_at = parse_timestamp(&billing_str, "next_billing_at")?;
    let next_delivery_at = parse_timestamp(&delivery_str, "next_delivery_at")?;

    Ok(SubscriptionContract {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        selling_plan_id: row.get(2)?,
        status: parse_db(&status_str, "status")?,
        next_billing_at,
        next_delivery_at,
        billing_anchor_at: parse_timestamp_opt(billing_anchor, "billing_anchor_at")?
            .unwrap_or(next_billing_at),
        delivery_anchor_at: parse_timestamp_opt(delivery_anchor, "delivery_anchor_at")?
            .unwrap_or(next_delivery_at),
        interval: parse_db(&interval_str, "billing_interval")?,
        line_items: Vec::new(),
        delivery_address_id: row.get(7)?,
        payment_method_ref: row.get(8)?,
        field_times: parse_json(&times_str, "field_times")?,
        created_at: parse_timestamp(&created_str, "created_at")?,
        updated_at: parse_timestamp(&updated_str, "updated_at")?,
    })
}

fn load_lines(conn: &Connection, subscription_id: i64) -> Result<Vec<LineItem>> {
    let mut stmt = conn.prepare(
        "SELECT variant_id, quantity, unit_price_cents FROM subscription_lines
         WHERE subscription_id = ?1 ORDER BY position",
    )?;
    let lines = stmt
        .query_map(params![subscription_id], |row| {
            Ok(LineItem {
                variant_id: row.get(0)?,
                quantity: row.get(1)?,
                unit_price_cents: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines)
}

pub(crate) fn load_subscription(
    conn: &Connection,
    id: i64,
) -> Result<Option<SubscriptionContract>> {
    let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1");
    let contract = conn
        .query_row(&sql, params![id], row_to_contract)
        .optional()?;
    match contract {
        Some(mut contract) => {
            contract.line_items = load_lines(conn, id)?;
            Ok(Some(contract))
        }
        None => Ok(None),
    }
}

/// Persist status, dates and field times of a loaded contract.
pub(crate) fn store_contract_state(
    conn: &Connection,
    contract: &SubscriptionContract,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE subscriptions SET status = ?1, next_billing_at = ?2, next_delivery_at = ?3,
             field_times = ?4, updated_at = ?5, billing_anchor_at = ?6, delivery_anchor_at = ?7
         WHERE id = ?8",
        params![
            contract.status.as_str(),
            contract.next_billing_at.to_rfc3339(),
            contract.next_delivery_at.to_rfc3339(),
            serde_json::to_string(&contract.field_times)?,
            contract.updated_at.to_rfc3339(),
            contract.billing_anchor_at.to_rfc3339(),
            contract.delivery_anchor_at.to_rfc3339(),
            contract.id,
        ],
    )?;
    if changed == 0 {
        return Err(Error::SubscriptionNotFound(contract.id));
    }
    Ok(())
}

impl Database {
    /// Insert a contract and its line items in one transaction.
    pub fn insert_subscription(
        &self,
        new: &NewSubscription,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionContract> {
        if new.line_items.is_empty() {
            return Err(Error::FieldRequired {
                field: "line_items",
            });
        }
        let field_times: BTreeMap<String, DateTime<Utc>> = [
            CONTRACT_FIELD_STATUS,
            CONTRACT_FIELD_NEXT_BILLING,
            CONTRACT_FIELD_NEXT_DELIVERY,
        ]
        .into_iter()
        .map(|f| (f.to_string(), now))
        .collect();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO subscriptions (customer_id, selling_plan_id, status, next_billing_at,
                 next_delivery_at, billing_interval, delivery_address_id, payment_method_ref,
                 field_times, created_at, updated_at, billing_anchor_at, delivery_anchor_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?4, ?5)",
            params![
                new.customer_id,
                new.selling_plan_id,
                status.as_str(),
                new.first_billing_at.to_rfc3339(),
                new.first_delivery_at.to_rfc3339(),
                new.interval.to_string(),
                new.delivery_address_id,
                new.payment_method_ref,
                serde_json::to_string(&field_times)?,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        for (position, line) in new.line_items.iter().enumerate() {
            tx.execute(
                "INSERT INTO subscription_lines
                     (subscription_id, position, variant_id, quantity, unit_price_cents)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    position as i64,
                    line.variant_id,
                    line.quantity,
                    line.unit_price_cents
                ],
            )?;
        }
        tx.commit()?;

        Ok(SubscriptionContract {
            id,
            customer_id: new.customer_id,
            selling_plan_id: new.selling_plan_id,
            status,
            next_billing_at: new.first_billing_at,
            next_delivery_at: new.first_delivery_at,
            billing_anchor_at: new.first_billing_at,
            delivery_anchor_at: new.first_delivery_at,
            interval: new.interval,
            line_items: new.line_items.clone(),
            delivery_address_id: new.delivery_address_id,
            payment_method_ref: new.payment_method_ref.clone(),
            created_at: now,
            updated_at: now,
            field_times,
        })
    }

    /// Get a contract with its line items.
    pub fn get_subscription(&self, id: i64) -> Result<SubscriptionContract> {
        load_subscription(&self.conn, id)?.ok_or(Error::SubscriptionNotFound(id))
    }

    /// List contracts, optionally filtered by status.
    pub fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<SubscriptionContract>> {
        let ids: Vec<i64> = match status {
            Some(s) => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id FROM subscriptions WHERE status = ?1 ORDER BY id")?;
                let ids = stmt
                    .query_map(params![s.as_str()], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            }
            None => {
                let mut stmt = self.conn.prepare("SELECT id FROM subscriptions ORDER BY id")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            }
        };
        ids.into_iter().map(|id| self.get_subscription(id)).collect()
    }

    /// Active contracts whose next billing date is at or before `as_of`.
    pub fn due_subscriptions(&self, as_of: DateTime<Utc>) -> Result<Vec<SubscriptionContract>> {
        Ok(self
            .list_subscriptions(Some(SubscriptionStatus::Active))?
            .into_iter()
            .filter(|c| c.next_billing_at <= as_of)
            .collect())
    }

    /// Move a contract to `status`, enforcing the lifecycle transitions.
    pub fn set_subscription_status(
        &self,
        id: i64,
        status: SubscriptionStatus,
        at: DateTime<Utc>,
    ) -> Result<SubscriptionContract> {
        let mut contract = self.get_subscription(id)?;
        contract.status.check_transition(status)?;
        contract.status = status;
        contract
            .field_times
            .insert(CONTRACT_FIELD_STATUS.to_string(), at);
        contract.updated_at = at;
        store_contract_state(&self.conn, &contract)?;
        Ok(contract)
    }

    /// Set the next billing and delivery dates of a contract.
    pub fn set_subscription_dates(
        &self,
        id: i64,
        next_billing_at: DateTime<Utc>,
        next_delivery_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<SubscriptionContract> {
        store_dates(&self.conn, id, next_billing_at, next_delivery_at, at)
    }
}

pub(crate) fn store_dates(
    conn: &Connection,
    id: i64,
    next_billing_at: DateTime<Utc>,
    next_delivery_at: DateTime<Utc>,
    at: DateTime<Utc>,
) -> Result<SubscriptionContract> {
    let mut contract = load_subscription(conn, id)?.ok_or(Error::SubscriptionNotFound(id))?;
    contract.next_billing_at = next_billing_at;
    contract.next_delivery_at = next_delivery_at;
    for field in [CONTRACT_FIELD_NEXT_BILLING, CONTRACT_FIELD_NEXT_DELIVERY] {
        contract.field_times.insert(field.to_string(), at);
    }
    contract.updated_at = at;
    store_contract_state(conn, &contract)?;
    Ok(contract)
}

#[cfg(test)]
#[path = "subscriptions_tests.rs"]
mod tests;
