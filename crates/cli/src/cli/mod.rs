// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

mod args;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use sync_core::{SubscriptionStatus, WebhookState};

use crate::colors;
use crate::help;

pub use args::{parse_instant, EntityArgs, OutputArgs};
use args::{parse_subscription_status, parse_webhook_state};

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "storesync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operate the local store mirror: push queue, webhooks, subscriptions and billing")]
#[command(after_help = help::quickstart())]
#[command(styles = help::styles())]
pub struct Cli {
    /// State directory holding the database and lock files
    #[arg(long, global = true, value_name = "path")]
    pub state_dir: Option<PathBuf>,

    /// Configuration file (defaults to <state-dir>/storesync.toml)
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show push backlog, errored entities and webhook counts
    Status {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// List entities whose last push failed
    Errors {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// List the push queue
    Queue {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Push local changes
    #[command(subcommand)]
    Push(PushCommand),

    /// Inspect and replay webhook deliveries
    #[command(subcommand)]
    Webhooks(WebhooksCommand),

    /// Run and inspect subscription billing
    #[command(subcommand)]
    Billing(BillingCommand),

    /// Manage subscription contracts
    #[command(subcommand)]
    Subscription(SubscriptionCommand),

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum PushCommand {
    /// Push every due queue entry, parents first
    #[command(after_help = colors::examples("\
Examples:
  storesync push sweep    Drain the due part of the queue"))]
    Sweep {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Push one entity now
    Entity {
        #[command(flatten)]
        entity: EntityArgs,
    },

    /// Clear a conflict pause after manual reconciliation
    #[command(after_help = colors::examples("\
Examples:
  storesync push resume product 7    Requeue product 7 after fixing the remote record"))]
    Resume {
        #[command(flatten)]
        entity: EntityArgs,
    },
}

#[derive(Subcommand)]
pub enum WebhooksCommand {
    /// Replay deferred webhook events
    Retry,

    /// List logged webhook events
    List {
        /// Only events in this state (applied, deferred, orphaned, ignored)
        #[arg(long, value_parser = parse_webhook_state, default_value = "deferred")]
        state: WebhookState,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand)]
pub enum BillingCommand {
    /// Charge every active subscription whose billing date has passed
    #[command(after_help = colors::examples("\
Examples:
  storesync billing run                     Bill everything due now
  storesync billing run --as-of 2025-01-15  Bill as of a given date"))]
    Run {
        /// Bill as of this date (YYYY-MM-DD or RFC 3339); defaults to now
        #[arg(long, value_parser = parse_instant)]
        as_of: Option<DateTime<Utc>>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List billing attempts of one subscription
    Attempts {
        /// Subscription id
        subscription: i64,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand)]
pub enum SubscriptionCommand {
    /// List subscription contracts
    List {
        /// Only contracts in this status
        #[arg(long, value_parser = parse_subscription_status)]
        status: Option<SubscriptionStatus>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show a contract with its skips and billing attempts
    Show {
        id: i64,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Skip the next billing cycle
    Skip {
        id: i64,

        /// Reason recorded with the skip
        #[arg(long)]
        reason: Option<String>,
    },

    /// Cancel a contract (remote first)
    Cancel { id: i64 },

    /// Pause an active contract
    Pause { id: i64 },

    /// Resume a paused contract
    Resume { id: i64 },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration with secrets redacted
    Show,
}

#[cfg(test)]
#[path = "../cli_tests/mod.rs"]
mod tests;
