// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variables read by the daemon.

use std::path::PathBuf;

pub mod names {
    include!(concat!(env!("OUT_DIR"), "/env_names.rs"));
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Explicit state directory override.
pub fn state_dir() -> Option<PathBuf> {
    non_empty(names::STORESYNC_STATE_DIR).map(PathBuf::from)
}

pub fn xdg_state_home() -> Option<PathBuf> {
    non_empty(names::XDG_STATE_HOME).map(PathBuf::from)
}

/// Configuration file override.
pub fn config_path() -> Option<PathBuf> {
    non_empty(names::STORESYNC_CONFIG).map(PathBuf::from)
}

pub fn access_token() -> Option<String> {
    non_empty(names::STORESYNC_ACCESS_TOKEN)
}

pub fn webhook_secret() -> Option<String> {
    non_empty(names::STORESYNC_WEBHOOK_SECRET)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
