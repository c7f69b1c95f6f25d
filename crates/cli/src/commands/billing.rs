// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use sync_engine::{acquire_billing_lock, BillingReport, Engine};

use crate::cli::{BillingCommand, OutputFormat};
use crate::display::{format_attempts, format_billing};
use crate::error::{Error, Result};

use super::{open_engine, print_json, Paths};

/// Execute a billing subcommand.
pub fn run(paths: &Paths, cmd: BillingCommand) -> Result<()> {
    match cmd {
        BillingCommand::Run { as_of, output } => {
            let engine = open_engine(paths)?;
            // Shared with the daemon's scheduled runs.
            let _lock = acquire_billing_lock(&paths.state_dir)?;
            run_due(&engine, as_of, output.output).map(|_| ())
        }
        BillingCommand::Attempts {
            subscription,
            output,
        } => attempts(&open_engine(paths)?, subscription, output.output),
    }
}

pub(crate) fn run_due(
    engine: &Engine,
    as_of: Option<DateTime<Utc>>,
    output: OutputFormat,
) -> Result<BillingReport> {
    let as_of = as_of.unwrap_or_else(|| engine.context.now());
    let report = engine.billing.run_due(as_of)?;
    match output {
        OutputFormat::Text => println!("{}", format_billing(&report, as_of)),
        OutputFormat::Json => print_json(&report)?,
    }
    if report.errors > 0 {
        tracing::warn!(errors = report.errors, %as_of, "billing run finished with errors");
        return Err(Error::BillingErrors {
            errors: report.errors,
        });
    }
    Ok(report)
}

pub(crate) fn attempts(engine: &Engine, subscription: i64, output: OutputFormat) -> Result<()> {
    let attempts = {
        let db = engine.context.store.lock();
        db.get_subscription(subscription)?;
        db.list_billing_attempts(subscription)?
    };
    match output {
        OutputFormat::Text => print!("{}", format_attempts(&attempts)),
        OutputFormat::Json => print_json(&attempts)?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "billing_tests.rs"]
mod tests;
