// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription contract, skip and billing attempt types.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::changeset::ChangeSet;
use crate::entity::EntityKey;
use crate::error::{Error, Result};

/// Contract fields that carry their own change time for merging.
pub const CONTRACT_FIELD_STATUS: &str = "status";
pub const CONTRACT_FIELD_NEXT_BILLING: &str = "next_billing_at";
pub const CONTRACT_FIELD_NEXT_DELIVERY: &str = "next_delivery_at";

/// Lifecycle state of a subscription contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Stored locally, remote contract not created yet.
    Draft,
    Active,
    Paused,
    /// Terminal.
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Draft => "draft",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    /// Check if a transition from this status to target is valid.
    pub fn can_transition_to(&self, target: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (Draft, Active)
                | (Draft, Cancelled)
                | (Active, Paused)
                | (Active, Cancelled)
                | (Paused, Active)
                | (Paused, Cancelled)
        )
    }

    /// Get valid transition targets as a formatted string.
    pub fn valid_targets(&self) -> String {
        match self {
            SubscriptionStatus::Draft => "active, cancelled".to_string(),
            SubscriptionStatus::Active => "paused, cancelled".to_string(),
            SubscriptionStatus::Paused => "active, cancelled".to_string(),
            SubscriptionStatus::Cancelled => "none (terminal)".to_string(),
        }
    }

    /// Returns the error for an illegal move to `target`, or Ok.
    pub fn check_transition(&self, target: SubscriptionStatus) -> Result<()> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: target.to_string(),
                valid_targets: self.valid_targets(),
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(SubscriptionStatus::Draft),
            "active" => Ok(SubscriptionStatus::Active),
            "paused" => Ok(SubscriptionStatus::Paused),
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            _ => Err(Error::InvalidSubscriptionStatus(s.to_string())),
        }
    }
}

/// Calendar unit of a billing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }
}

/// How far one billing cycle moves the billing and delivery dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInterval {
    pub unit: IntervalUnit,
    pub count: u32,
}

impl BillingInterval {
    pub fn new(unit: IntervalUnit, count: u32) -> Self {
        BillingInterval { unit, count }
    }

    pub fn monthly() -> Self {
        BillingInterval::new(IntervalUnit::Month, 1)
    }

    /// Advances `at` by one interval.
    ///
    /// Month arithmetic clamps to the last day of shorter months
    /// (Jan 31 + 1 month = Feb 28/29).
    pub fn advance(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.advance_by(at, 1)
    }

    /// Advances `anchor` by `cycles` intervals in one step, so month-end
    /// anchors clamp per target month instead of drifting.
    pub fn advance_by(&self, anchor: DateTime<Utc>, cycles: u32) -> Result<DateTime<Utc>> {
        let overflow = || Error::DateOverflow(format!("{anchor} by {cycles}x{self}"));
        let count = self.count.checked_mul(cycles).ok_or_else(overflow)?;
        let advanced = match self.unit {
            IntervalUnit::Day => anchor.checked_add_signed(Duration::days(i64::from(count))),
            IntervalUnit::Week => anchor.checked_add_signed(Duration::weeks(i64::from(count))),
            IntervalUnit::Month => anchor.checked_add_months(Months::new(count)),
            IntervalUnit::Year => count
                .checked_mul(12)
                .and_then(|months| anchor.checked_add_months(Months::new(months))),
        };
        advanced.ok_or_else(overflow)
    }

    /// The cycle after `current` on the schedule anchored at `anchor`.
    ///
    /// A `current` that is not a cycle of that schedule is advanced on its
    /// own.
    pub fn next_on_schedule(
        &self,
        anchor: DateTime<Utc>,
        current: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if current < anchor {
            return self.advance(current);
        }
        let mut cycles = 0u32;
        loop {
            let at = self.advance_by(anchor, cycles)?;
            if at == current {
                return self.advance_by(anchor, cycles + 1);
            }
            if at > current {
                return self.advance(current);
            }
            cycles = cycles
                .checked_add(1)
                .ok_or_else(|| Error::DateOverflow(format!("{current} from {anchor}")))?;
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.as_str())
    }
}

impl FromStr for BillingInterval {
    type Err = Error;

    /// Parses `<count><unit>`, e.g. `1month`, `2week`, `30day`, `1year`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().to_lowercase();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::InvalidInterval(s.to_string()))?;
        let (count, unit) = trimmed.split_at(split);
        let count: u32 = count
            .parse()
            .map_err(|_| Error::InvalidInterval(s.to_string()))?;
        if count == 0 {
            return Err(Error::InvalidInterval(s.to_string()));
        }
        let unit = match unit.trim_end_matches('s') {
            "day" => IntervalUnit::Day,
            "week" => IntervalUnit::Week,
            "month" => IntervalUnit::Month,
            "year" => IntervalUnit::Year,
            _ => return Err(Error::InvalidInterval(s.to_string())),
        };
        Ok(BillingInterval::new(unit, count))
    }
}

/// One product line of a contract. Prices are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Local id of the product variant.
    pub variant_id: i64,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// A recurring order agreement mirrored on the remote platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionContract {
    pub id: i64,
    pub customer_id: i64,
    pub selling_plan_id: i64,
    pub status: SubscriptionStatus,
    pub next_billing_at: DateTime<Utc>,
    pub next_delivery_at: DateTime<Utc>,
    /// First date of the current billing schedule; cycles are counted from it.
    pub billing_anchor_at: DateTime<Utc>,
    pub delivery_anchor_at: DateTime<Utc>,
    pub interval: BillingInterval,
    pub line_items: Vec<LineItem>,
    pub delivery_address_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last change time of `status`, `next_billing_at` and `next_delivery_at`.
    pub field_times: BTreeMap<String, DateTime<Utc>>,
}

impl SubscriptionContract {
    pub fn key(&self) -> EntityKey {
        EntityKey::contract(self.id)
    }

    /// Billing and delivery dates after one more cycle.
    pub fn next_cycle_dates(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((
            self.interval
                .next_on_schedule(self.billing_anchor_at, self.next_billing_at)?,
            self.interval
                .next_on_schedule(self.delivery_anchor_at, self.next_delivery_at)?,
        ))
    }
}

/// Ledger change set of a move of both contract dates.
pub fn cycle_changes(next_billing_at: DateTime<Utc>, next_delivery_at: DateTime<Utc>) -> ChangeSet {
    ChangeSet::new()
        .set(CONTRACT_FIELD_NEXT_BILLING, next_billing_at.to_rfc3339())
        .set(CONTRACT_FIELD_NEXT_DELIVERY, next_delivery_at.to_rfc3339())
}

/// Input for creating a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub customer_id: i64,
    pub selling_plan_id: i64,
    pub first_billing_at: DateTime<Utc>,
    pub first_delivery_at: DateTime<Utc>,
    pub interval: BillingInterval,
    pub line_items: Vec<LineItem>,
    pub delivery_address_id: i64,
    pub payment_method_ref: Option<String>,
}

/// Limits on how subscribers may skip billing cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipPolicy {
    /// Confirmed skips allowed within one calendar year of billing dates.
    pub max_skips_per_period: u32,
    /// Confirmed skips allowed since the last successful billing attempt.
    pub max_consecutive_skips: u32,
    /// Minimum whole days between the request and the skipped billing date.
    pub advance_notice_days: u32,
    /// Fee charged per skip, in minor currency units.
    pub skip_fee_cents: i64,
}

impl Default for SkipPolicy {
    fn default() -> Self {
        SkipPolicy {
            max_skips_per_period: 4,
            max_consecutive_skips: 2,
            advance_notice_days: 7,
            skip_fee_cents: 0,
        }
    }
}

/// Status of a skip request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl SkipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipStatus::Pending => "pending",
            SkipStatus::Confirmed => "confirmed",
            SkipStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SkipStatus::Pending)
    }
}

impl fmt::Display for SkipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SkipStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SkipStatus::Pending),
            "confirmed" => Ok(SkipStatus::Confirmed),
            "cancelled" => Ok(SkipStatus::Cancelled),
            _ => Err(Error::InvalidRecordStatus {
                kind: "skip",
                value: s.to_string(),
            }),
        }
    }
}

/// Audit record of one skipped billing cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub id: i64,
    pub subscription_id: i64,
    pub status: SkipStatus,
    pub original_billing_at: DateTime<Utc>,
    pub new_billing_at: DateTime<Utc>,
    pub new_delivery_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub fee_cents: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Status of a billing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Pending)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AttemptStatus::Pending),
            "success" => Ok(AttemptStatus::Success),
            "failed" => Ok(AttemptStatus::Failed),
            _ => Err(Error::InvalidRecordStatus {
                kind: "billing attempt",
                value: s.to_string(),
            }),
        }
    }
}

/// One charge for one billing cycle of a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAttempt {
    pub id: i64,
    pub subscription_id: i64,
    /// Billing date of the cycle this attempt charges.
    pub cycle_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_order_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Deterministic idempotency key of one billing cycle.
///
/// The same subscription and cycle date always produce the same key, so a
/// re-run or an overlapping run collides instead of charging twice.
pub fn billing_idempotency_key(subscription_id: i64, cycle_at: DateTime<Utc>) -> String {
    format!("sub-{}:{}", subscription_id, cycle_at.format("%Y-%m-%d"))
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
