// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use sync_core::WebhookState;
use sync_engine::{Engine, ReplayReport};

use crate::cli::{OutputFormat, WebhooksCommand};
use crate::display::{format_events, format_replay};
use crate::error::Result;

use super::{open_engine, print_json, Paths};

/// Execute a webhooks subcommand.
pub fn run(paths: &Paths, cmd: WebhooksCommand) -> Result<()> {
    let engine = open_engine(paths)?;
    match cmd {
        WebhooksCommand::Retry => retry(&engine).map(|_| ()),
        WebhooksCommand::List { state, output } => list(&engine, state, output.output),
    }
}

pub(crate) fn retry(engine: &Engine) -> Result<ReplayReport> {
    let report = engine.webhooks.retry_deferred()?;
    println!("{}", format_replay(&report));
    Ok(report)
}

pub(crate) fn list(engine: &Engine, state: WebhookState, output: OutputFormat) -> Result<()> {
    let events = engine.context.store.lock().webhook_events_in_state(state)?;
    match output {
        OutputFormat::Text => print!("{}", format_events(&events)),
        OutputFormat::Json => print_json(&events)?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "webhooks_tests.rs"]
mod tests;
