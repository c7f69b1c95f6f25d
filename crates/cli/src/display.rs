// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering for operator views.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use sync_core::{
    BillingAttempt, EntityKey, QueueItem, SkipRecord, StoredEvent, SubscriptionContract, SyncState,
};
use sync_engine::{BillingReport, PushOutcome, ReplayReport, SubscriptionView, SweepReport};

use crate::commands::status::StatusSummary;

pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

pub fn format_status(summary: &StatusSummary) -> String {
    let mut out = String::new();
    let q = &summary.queue;
    let _ = writeln!(
        out,
        "Push queue: {} due, {} deferred, {} parked",
        q.due, q.deferred, q.parked
    );
    let _ = writeln!(out, "Push errors: {}", summary.errored);
    let _ = writeln!(out, "Paused after conflict: {}", summary.paused);
    let _ = writeln!(
        out,
        "Webhooks: {} deferred, {} orphaned",
        summary.webhooks_deferred, summary.webhooks_orphaned
    );
    let _ = writeln!(out, "Pending billing attempts: {}", summary.pending_charges);
    out
}

pub fn format_errors(states: &[SyncState]) -> String {
    if states.is_empty() {
        return "No push errors\n".to_string();
    }
    let mut out = String::new();
    for state in states {
        let kind = state
            .last_error_kind
            .map_or("error", |k| k.as_str());
        let paused = if state.push_paused { " (paused)" } else { "" };
        let _ = writeln!(
            out,
            "{} [{kind}]{paused} {}",
            state.key,
            state.last_error.as_deref().unwrap_or("")
        );
    }
    out
}

pub fn format_queue(items: &[QueueItem], now: DateTime<Utc>) -> String {
    if items.is_empty() {
        return "Push queue is empty\n".to_string();
    }
    let mut out = String::new();
    for item in items {
        let when = match item.not_before {
            Some(at) if at > now => format!("after {}", format_time(at)),
            _ => "due".to_string(),
        };
        let _ = write!(
            out,
            "{} {} {} attempts={} {when}",
            item.key, item.state, item.reason, item.attempts
        );
        if let Some(error) = &item.last_error {
            let _ = write!(out, " error={error}");
        }
        out.push('\n');
    }
    out
}

pub fn format_push_outcome(key: EntityKey, outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::Clean => format!("{key}: nothing to push"),
        PushOutcome::Paused => {
            format!("{key}: paused after a conflict\n  hint: storesync push resume {} {}", key.kind, key.local_id)
        }
        PushOutcome::Dropped => format!("{key}: deleted before first push, dropped"),
        PushOutcome::Created { remote_id } => format!("{key}: created {remote_id}"),
        PushOutcome::Adopted { remote_id } => format!("{key}: adopted existing {remote_id}"),
        PushOutcome::Updated => format!("{key}: updated"),
        PushOutcome::Blocked { missing } => {
            let missing: Vec<String> = missing.iter().map(ToString::to_string).collect();
            format!("{key}: waiting for {}", missing.join(", "))
        }
        PushOutcome::Deferred { error } => format!("{key}: deferred ({error})"),
        PushOutcome::Parked { error } => format!("{key}: parked ({error})"),
        PushOutcome::Conflicted { error } => format!("{key}: conflict, pushes paused ({error})"),
    }
}

pub fn format_sweep(report: &SweepReport) -> String {
    let mut out = format!(
        "Attempted {}: {} pushed, {} clean, {} blocked, {} deferred, {} parked, {} conflicts, {} errors",
        report.attempted,
        report.pushed,
        report.clean,
        report.blocked,
        report.deferred,
        report.parked,
        report.conflicts,
        report.errors
    );
    if report.cancelled {
        out.push_str(" (cancelled)");
    }
    out
}

pub fn format_replay(report: &ReplayReport) -> String {
    format!(
        "Replayed {}: {} applied, {} still deferred, {} orphaned, {} ignored",
        report.replayed, report.applied, report.deferred, report.orphaned, report.ignored
    )
}

pub fn format_billing(report: &BillingReport, as_of: DateTime<Utc>) -> String {
    format!(
        "Billing as of {}: {} due, {} charged, {} failed, {} pending, {} already attempted, {} not synced, {} errors",
        format_time(as_of),
        report.due,
        report.succeeded,
        report.failed,
        report.pending,
        report.already_attempted,
        report.not_synced,
        report.errors
    )
}

pub fn format_attempts(attempts: &[BillingAttempt]) -> String {
    if attempts.is_empty() {
        return "No billing attempts\n".to_string();
    }
    let mut out = String::new();
    for attempt in attempts {
        let _ = write!(
            out,
            "#{} {} {} cycle={} at {}",
            attempt.id,
            attempt.idempotency_key,
            attempt.status,
            format_date(attempt.cycle_at),
            format_time(attempt.created_at)
        );
        if let Some(order) = &attempt.remote_order_ref {
            let _ = write!(out, " order={order}");
        }
        if let Some(error) = &attempt.error {
            let _ = write!(out, " error={error}");
        }
        out.push('\n');
    }
    out
}

pub fn format_subscriptions(contracts: &[SubscriptionContract]) -> String {
    if contracts.is_empty() {
        return "No subscriptions\n".to_string();
    }
    let mut out = String::new();
    for c in contracts {
        let _ = writeln!(
            out,
            "{} {} customer={} every {} next billing {}",
            c.id,
            c.status,
            c.customer_id,
            c.interval,
            format_date(c.next_billing_at)
        );
    }
    out
}

pub fn format_skip(skip: &SkipRecord) -> String {
    let mut out = format!(
        "Skipped {} ({}): next billing {}, next delivery {}",
        format_date(skip.original_billing_at),
        skip.status,
        format_date(skip.new_billing_at),
        format_date(skip.new_delivery_at)
    );
    if skip.fee_cents > 0 {
        let _ = write!(out, ", fee {}", format_cents(skip.fee_cents));
    }
    out
}

pub fn format_subscription(view: &SubscriptionView) -> String {
    let c = &view.contract;
    let mut out = String::new();
    let _ = writeln!(out, "Subscription {} [{}]", c.id, c.status);
    let _ = writeln!(out, "Customer: {}", c.customer_id);
    let _ = writeln!(out, "Interval: every {}", c.interval);
    let _ = writeln!(out, "Next billing: {}", format_date(c.next_billing_at));
    let _ = writeln!(out, "Next delivery: {}", format_date(c.next_delivery_at));
    match view.sync.as_ref().and_then(|s| s.remote_id.as_deref()) {
        Some(remote_id) if !sync_core::is_unassigned(Some(remote_id)) => {
            let _ = writeln!(out, "Remote: {remote_id}");
        }
        _ => {
            let _ = writeln!(out, "Remote: not synced");
        }
    }
    if let Some(error) = view.sync.as_ref().and_then(|s| s.last_error.as_deref()) {
        let _ = writeln!(out, "Last push error: {error}");
    }

    let _ = writeln!(out, "\nLines:");
    for line in &c.line_items {
        let _ = writeln!(
            out,
            "  variant {} x{} @ {}",
            line.variant_id,
            line.quantity,
            format_cents(line.unit_price_cents)
        );
    }

    if !view.skips.is_empty() {
        let _ = writeln!(out, "\nSkips:");
        for skip in &view.skips {
            let _ = writeln!(out, "  {}", format_skip(skip));
        }
    }

    let _ = writeln!(
        out,
        "\nBilling attempts (failures this cycle: {}):",
        view.failures_this_cycle
    );
    for line in format_attempts(&view.attempts).lines() {
        let _ = writeln!(out, "  {line}");
    }
    out
}

pub fn format_events(events: &[StoredEvent]) -> String {
    if events.is_empty() {
        return "No webhook events\n".to_string();
    }
    let mut out = String::new();
    for event in events {
        let _ = write!(
            out,
            "{} {} {} {} deferrals={} received {}",
            event.event_id,
            event.topic,
            event.remote_id,
            event.state,
            event.deferrals,
            format_time(event.received_at)
        );
        if let Some(detail) = &event.detail {
            let _ = write!(out, " ({detail})");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
