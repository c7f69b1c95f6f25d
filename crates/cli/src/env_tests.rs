// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::path::PathBuf;

// Each test owns one variable so they can run in parallel.

#[test]
fn test_vars_constants() {
    assert_eq!(vars::NO_COLOR, "NO_COLOR");
    assert_eq!(vars::COLOR, "COLOR");
    assert_eq!(vars::STORESYNC_STATE_DIR, "STORESYNC_STATE_DIR");
    assert_eq!(vars::XDG_STATE_HOME, "XDG_STATE_HOME");
    assert_eq!(vars::STORESYNC_CONFIG, "STORESYNC_CONFIG");
    assert_eq!(vars::STORESYNC_ACCESS_TOKEN, "STORESYNC_ACCESS_TOKEN");
    assert_eq!(vars::STORESYNC_WEBHOOK_SECRET, "STORESYNC_WEBHOOK_SECRET");
}

#[test]
fn test_no_color() {
    std::env::remove_var("NO_COLOR");
    assert!(!no_color());
    std::env::set_var("NO_COLOR", "true");
    assert!(!no_color());
    std::env::set_var("NO_COLOR", "1");
    assert!(no_color());
    std::env::remove_var("NO_COLOR");
}

#[test]
fn test_force_color() {
    std::env::remove_var("COLOR");
    assert!(!force_color());
    std::env::set_var("COLOR", "yes");
    assert!(!force_color());
    std::env::set_var("COLOR", "1");
    assert!(force_color());
    std::env::remove_var("COLOR");
}

#[test]
fn test_state_dir() {
    std::env::remove_var("STORESYNC_STATE_DIR");
    assert_eq!(state_dir(), None);
    std::env::set_var("STORESYNC_STATE_DIR", "/tmp/storesync-test");
    assert_eq!(state_dir(), Some(PathBuf::from("/tmp/storesync-test")));
    std::env::set_var("STORESYNC_STATE_DIR", "");
    assert_eq!(state_dir(), None);
    std::env::remove_var("STORESYNC_STATE_DIR");
}

#[test]
fn test_xdg_state_home() {
    std::env::set_var("XDG_STATE_HOME", "/tmp/xdg-test");
    assert_eq!(xdg_state_home(), Some(PathBuf::from("/tmp/xdg-test")));
    std::env::remove_var("XDG_STATE_HOME");
    assert_eq!(xdg_state_home(), None);
}

#[test]
fn test_config_path() {
    std::env::set_var("STORESYNC_CONFIG", "/etc/storesync.toml");
    assert_eq!(config_path(), Some(PathBuf::from("/etc/storesync.toml")));
    std::env::remove_var("STORESYNC_CONFIG");
    assert_eq!(config_path(), None);
}

#[test]
fn test_secrets() {
    std::env::set_var("STORESYNC_ACCESS_TOKEN", "shpat_abc");
    std::env::set_var("STORESYNC_WEBHOOK_SECRET", "");
    assert_eq!(access_token().as_deref(), Some("shpat_abc"));
    assert_eq!(webhook_secret(), None);
    std::env::remove_var("STORESYNC_ACCESS_TOKEN");
    std::env::remove_var("STORESYNC_WEBHOOK_SECRET");
}
