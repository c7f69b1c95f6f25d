// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;
use sync_core::{Ledger, QueueStats, WebhookState};
use sync_engine::Engine;

use crate::cli::OutputFormat;
use crate::display::{format_errors, format_queue, format_status};
use crate::error::Result;

use super::{open_engine, print_json, Paths};

/// Backlog overview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub queue: QueueStats,
    /// Entities whose last push failed.
    pub errored: usize,
    pub paused: usize,
    pub webhooks_deferred: usize,
    pub webhooks_orphaned: usize,
    pub pending_charges: usize,
}

pub fn summarize(engine: &Engine) -> Result<StatusSummary> {
    let now = engine.context.now();
    let db = engine.context.store.lock();
    let errored = db.errored_states()?;
    let mut summary = StatusSummary {
        queue: db.queue_stats(now)?,
        errored: errored.len(),
        paused: errored.iter().filter(|s| s.push_paused).count(),
        pending_charges: db.pending_billing_attempts()?.len(),
        ..StatusSummary::default()
    };
    for (state, count) in db.webhook_event_counts()? {
        match state {
            WebhookState::Deferred => summary.webhooks_deferred = count,
            WebhookState::Orphaned => summary.webhooks_orphaned = count,
            _ => {}
        }
    }
    Ok(summary)
}

pub fn run(paths: &Paths, output: OutputFormat) -> Result<()> {
    run_impl(&open_engine(paths)?, output)
}

pub(crate) fn run_impl(engine: &Engine, output: OutputFormat) -> Result<()> {
    let summary = summarize(engine)?;
    match output {
        OutputFormat::Text => print!("{}", format_status(&summary)),
        OutputFormat::Json => print_json(&summary)?,
    }
    Ok(())
}

pub fn errors(paths: &Paths, output: OutputFormat) -> Result<()> {
    errors_impl(&open_engine(paths)?, output)
}

pub(crate) fn errors_impl(engine: &Engine, output: OutputFormat) -> Result<()> {
    let states = engine.context.store.lock().errored_states()?;
    match output {
        OutputFormat::Text => print!("{}", format_errors(&states)),
        OutputFormat::Json => print_json(&states)?,
    }
    Ok(())
}

pub fn queue(paths: &Paths, output: OutputFormat) -> Result<()> {
    queue_impl(&open_engine(paths)?, output)
}

pub(crate) fn queue_impl(engine: &Engine, output: OutputFormat) -> Result<()> {
    let items = engine.context.store.lock().list_queue()?;
    match output {
        OutputFormat::Text => print!("{}", format_queue(&items, engine.context.now())),
        OutputFormat::Json => print_json(&items)?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
