// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use sync_core::EntityKey;
use sync_engine::{Engine, SweepReport};

use crate::cli::{EntityArgs, OutputFormat, PushCommand};
use crate::display::{format_push_outcome, format_sweep};
use crate::error::{Error, Result};

use super::{open_engine, print_json, Paths};

/// Execute a push subcommand.
pub fn run(paths: &Paths, cmd: PushCommand) -> Result<()> {
    let engine = open_engine(paths)?;
    match cmd {
        PushCommand::Sweep { output } => sweep(&engine, output.output).map(|_| ()),
        PushCommand::Entity { entity } => push_one(&engine, entity),
        PushCommand::Resume { entity } => resume(&engine, entity),
    }
}

fn key(entity: EntityArgs) -> EntityKey {
    EntityKey::new(entity.kind, entity.id)
}

pub(crate) fn sweep(engine: &Engine, output: OutputFormat) -> Result<SweepReport> {
    let report = engine.push.sweep()?;
    match output {
        OutputFormat::Text => println!("{}", format_sweep(&report)),
        OutputFormat::Json => print_json(&report)?,
    }
    if report.errors > 0 {
        return Err(Error::SweepErrors {
            errors: report.errors,
        });
    }
    Ok(report)
}

pub(crate) fn push_one(engine: &Engine, entity: EntityArgs) -> Result<()> {
    let key = key(entity);
    let outcome = engine.push.push(key)?;
    println!("{}", format_push_outcome(key, &outcome));
    Ok(())
}

pub(crate) fn resume(engine: &Engine, entity: EntityArgs) -> Result<()> {
    let key = key(entity);
    let state = engine.push.resume(key)?;
    if state.dirty {
        println!("{key}: resumed, queued for the next sweep");
    } else {
        println!("{key}: resumed");
    }
    Ok(())
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
