// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Help text generation with colorization support.

use crate::colors;
use clap::builder::styling::Styles;

/// Generate clap Styles for help output.
pub fn styles() -> Styles {
    if !colors::should_colorize() {
        return Styles::plain();
    }

    use anstyle::{Ansi256Color, Color, Style};

    let fg = |code: u8| Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(code))));
    let header = fg(colors::codes::HEADER);
    let context = fg(colors::codes::CONTEXT);

    Styles::styled()
        .header(header)
        .usage(header)
        .literal(fg(colors::codes::LITERAL))
        .placeholder(context)
        .valid(context)
        .error(fg(colors::codes::ALERT))
}

/// Text shown after the main help.
pub fn quickstart() -> String {
    colors::examples(
        "\
Quickstart:
  storesync status                  Backlog, errors and webhook counts
  storesync push sweep              Push every due queue entry now
  storesync billing run             Charge subscriptions that are due
  storesync subscription show 12    Contract, skips and billing attempts",
    )
}

#[cfg(test)]
#[path = "help_tests.rs"]
mod tests;
