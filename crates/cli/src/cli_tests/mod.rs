// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Parsing tests, split by command group.

use super::*;


fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(args)
}
