// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use sync_engine::Config;

use crate::cli::ConfigCommand;
use crate::error::Result;

use super::Paths;

const REDACTED: &str = "<redacted>";

/// Execute a config subcommand.
pub fn run(paths: &Paths, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let config = paths.load_config()?;
            println!("# {}", paths.config_path.display());
            print!("{}", render(&config)?);
            Ok(())
        }
    }
}

/// Effective configuration as TOML, with secrets masked.
pub(crate) fn render(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    for secret in [&mut shown.remote.access_token, &mut shown.webhook.secret] {
        if !secret.is_empty() {
            *secret = REDACTED.to_string();
        }
    }
    Ok(toml::to_string_pretty(&shown)?)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
