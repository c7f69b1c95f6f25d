// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! storesync - Operator CLI for the store sync engine.
//!
//! Every command opens the local datastore in the state directory, works
//! through the engine, and prints a text or JSON view.
//!
//! # Main Components
//!
//! - [`Cli`] - clap definition of the command tree
//! - [`run`] - dispatches a parsed command
//! - [`Error`] - errors reported to the operator

mod cli;
pub mod colors;
mod commands;
mod display;
pub mod env;
pub mod error;
pub mod help;

pub use cli::{
    BillingCommand, Cli, Command, ConfigCommand, OutputFormat, PushCommand, SubscriptionCommand,
    WebhooksCommand,
};
pub use commands::Paths;
pub use error::{Error, Result};

use clap::CommandFactory;
use clap_complete::generate;

/// Execute a parsed command line. This is the main entry point for library
/// users and provides a testable way to run commands without process execution.
pub fn run(cli: Cli) -> Result<()> {
    let paths = Paths::resolve(cli.state_dir, cli.config);
    match cli.command {
        Command::Status { output } => commands::status::run(&paths, output.output),
        Command::Errors { output } => commands::status::errors(&paths, output.output),
        Command::Queue { output } => commands::status::queue(&paths, output.output),
        Command::Push(cmd) => commands::push::run(&paths, cmd),
        Command::Webhooks(cmd) => commands::webhooks::run(&paths, cmd),
        Command::Billing(cmd) => commands::billing::run(&paths, cmd),
        Command::Subscription(cmd) => commands::subscription::run(&paths, cmd),
        Command::Config(cmd) => commands::config::run(&paths, cmd),
        Command::Completion { shell } => {
            let mut command = Cli::command();
            generate(shell, &mut command, "storesync", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Send engine logs to stderr, filtered by `RUST_LOG` (default `warn`).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber installed by the embedding program wins.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
