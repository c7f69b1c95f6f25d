// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::env::var("OUT_DIR")?;
    let path = std::path::Path::new(&out_dir).join("env_vars.rs");
    let mut f = std::fs::File::create(path)?;

    let vars = [
        ("NO_COLOR", "NO_COLOR"),
        ("COLOR", "COLOR"),
        ("STORESYNC_STATE_DIR", "STORESYNC_STATE_DIR"),
        ("XDG_STATE_HOME", "XDG_STATE_HOME"),
        ("STORESYNC_CONFIG", "STORESYNC_CONFIG"),
        ("STORESYNC_ACCESS_TOKEN", "STORESYNC_ACCESS_TOKEN"),
        ("STORESYNC_WEBHOOK_SECRET", "STORESYNC_WEBHOOK_SECRET"),
    ];

    for (const_name, env_name) in &vars {
        writeln!(f, "pub const {const_name}: &str = \"{env_name}\";")?;
    }

    Ok(())
}
