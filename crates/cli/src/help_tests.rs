// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn quickstart_mentions_core_commands() {
    let text = quickstart();
    for command in ["status", "push sweep", "billing run", "subscription show"] {
        assert!(text.contains(command), "missing {command}");
    }
}
