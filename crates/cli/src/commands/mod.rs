// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod billing;
pub mod config;
pub mod push;
pub mod status;
pub mod subscription;
#[cfg(test)]
#[path = "mod_tests.rs"]
pub mod testing;
pub mod webhooks;

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use sync_engine::{Config, Engine, CONFIG_FILE_NAME};

use crate::env;
use crate::error::Result;

/// Where the state directory and configuration live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
}

impl Paths {
    /// Flags win over environment variables, which win over the defaults.
    pub fn resolve(state_dir: Option<PathBuf>, config: Option<PathBuf>) -> Self {
        let state_dir = state_dir
            .or_else(env::state_dir)
            .unwrap_or_else(default_state_dir);
        let config_path = config
            .or_else(env::config_path)
            .unwrap_or_else(|| state_dir.join(CONFIG_FILE_NAME));
        Paths {
            state_dir,
            config_path,
        }
    }

    pub fn load_config(&self) -> Result<Config> {
        let config = Config::load(&self.config_path)?;
        Ok(config.with_secrets(env::access_token(), env::webhook_secret()))
    }
}

fn default_state_dir() -> PathBuf {
    if let Some(dir) = env::xdg_state_home() {
        return dir.join("storesync");
    }
    dirs::home_dir()
        .map(|h| h.join(".local/state/storesync"))
        .unwrap_or_else(|| PathBuf::from(".local/state/storesync"))
}

/// Helper to open the engine from the resolved paths.
pub fn open_engine(paths: &Paths) -> Result<Engine> {
    let config = paths.load_config()?;
    fs::create_dir_all(&paths.state_dir)?;
    let db_path = config.database.resolve(&paths.state_dir);
    tracing::debug!(db = %db_path.display(), "opening datastore");
    Ok(Engine::open(&config, &db_path)?)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
