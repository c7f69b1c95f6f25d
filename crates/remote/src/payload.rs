// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire shapes exchanged with the remote platform.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record as returned by the remote platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote identifier, e.g. `gid://shop/Customer/123`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Every other attribute.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>) -> Self {
        RemoteRecord {
            id: id.into(),
            updated_at: None,
            fields: Map::new(),
        }
    }
}

/// Request to charge one billing cycle of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAttemptRequest {
    /// Deterministic per contract and cycle; the platform deduplicates on it.
    pub idempotency_key: String,
    /// Billing date of the cycle being charged.
    pub cycle_date: NaiveDate,
}

/// Settlement state reported for a billing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Success,
    Failure,
    /// Accepted; the outcome arrives later by webhook.
    Pending,
}

/// Remote response to a billing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAttemptResult {
    /// Remote identifier of the attempt.
    pub id: String,
    pub status: ChargeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
