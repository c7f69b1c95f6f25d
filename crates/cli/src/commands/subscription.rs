// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use sync_core::{SkipRecord, SubscriptionContract, SubscriptionStatus};
use sync_engine::Engine;

use crate::cli::{OutputFormat, SubscriptionCommand};
use crate::display::{format_skip, format_subscription, format_subscriptions};
use crate::error::Result;

use super::{open_engine, print_json, Paths};

/// Execute a subscription subcommand.
pub fn run(paths: &Paths, cmd: SubscriptionCommand) -> Result<()> {
    let engine = open_engine(paths)?;
    match cmd {
        SubscriptionCommand::List { status, output } => list(&engine, status, output.output),
        SubscriptionCommand::Show { id, output } => show(&engine, id, output.output),
        SubscriptionCommand::Skip { id, reason } => {
            let skip = skip(&engine, id, reason.as_deref())?;
            println!("{}", format_skip(&skip));
            Ok(())
        }
        SubscriptionCommand::Cancel { id } => report(engine.lifecycle.cancel(id)?),
        SubscriptionCommand::Pause { id } => report(engine.lifecycle.pause(id)?),
        SubscriptionCommand::Resume { id } => report(engine.lifecycle.resume(id)?),
    }
}

fn report(contract: SubscriptionContract) -> Result<()> {
    println!("Subscription {} is {}", contract.id, contract.status);
    Ok(())
}

pub(crate) fn list(
    engine: &Engine,
    status: Option<SubscriptionStatus>,
    output: OutputFormat,
) -> Result<()> {
    let contracts = engine.context.store.lock().list_subscriptions(status)?;
    match output {
        OutputFormat::Text => print!("{}", format_subscriptions(&contracts)),
        OutputFormat::Json => print_json(&contracts)?,
    }
    Ok(())
}

pub(crate) fn show(engine: &Engine, id: i64, output: OutputFormat) -> Result<()> {
    let view = engine.lifecycle.show(id)?;
    match output {
        OutputFormat::Text => print!("{}", format_subscription(&view)),
        OutputFormat::Json => print_json(&view)?,
    }
    Ok(())
}

/// Skip the next cycle, requested now.
pub(crate) fn skip(engine: &Engine, id: i64, reason: Option<&str>) -> Result<SkipRecord> {
    Ok(engine
        .lifecycle
        .request_skip(id, engine.context.now(), reason)?)
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
