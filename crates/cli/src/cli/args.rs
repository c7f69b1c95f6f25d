// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared argument structs and value parsers.

use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use sync_core::{EntityKind, SubscriptionStatus, WebhookState};

use super::OutputFormat;

/// Output format argument.
#[derive(Args, Clone, Copy, Debug, Default)]
pub struct OutputArgs {
    /// Output format (text, json)
    #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Identifies one tracked entity.
#[derive(Args, Clone, Copy, Debug)]
pub struct EntityArgs {
    /// Entity kind (customer, address, product, product_variant, ...)
    #[arg(value_parser = parse_kind)]
    pub kind: EntityKind,

    /// Local id
    pub id: i64,
}

pub fn parse_kind(s: &str) -> Result<EntityKind, String> {
    s.parse().map_err(|e: sync_core::Error| e.to_string())
}

pub fn parse_subscription_status(s: &str) -> Result<SubscriptionStatus, String> {
    s.parse().map_err(|e: sync_core::Error| e.to_string())
}

pub fn parse_webhook_state(s: &str) -> Result<WebhookState, String> {
    s.parse().map_err(|e: sync_core::Error| e.to_string())
}

/// Accept `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| format!("invalid date '{s}'"));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| format!("invalid date '{s}': use YYYY-MM-DD or RFC 3339"))
}
