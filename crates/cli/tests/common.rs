// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// The CLI pointed at an isolated state directory, with no ambient
/// configuration or secrets leaking in from the environment.
pub fn storesync(state: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("storesync");
    cmd.arg("--state-dir")
        .arg(state.path())
        .env_remove("STORESYNC_STATE_DIR")
        .env_remove("STORESYNC_CONFIG")
        .env_remove("STORESYNC_ACCESS_TOKEN")
        .env_remove("STORESYNC_WEBHOOK_SECRET")
        .env("NO_COLOR", "1");
    cmd
}

pub fn state() -> TempDir {
    TempDir::new().unwrap()
}

/// Write `storesync.toml` into the state directory.
pub fn write_config(state: &TempDir, contents: &str) {
    std::fs::write(state.path().join("storesync.toml"), contents).unwrap();
}
