// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Configuration is read from `storesync.toml`:
//! - `[database]`: path of the SQLite file
//! - `[remote]`: platform base URL, access token and timeouts
//! - `[push]`: worker pool, in-call backoff and sweep cadence
//! - `[webhook]`: listener address, shared secret and deferral bound
//! - `[skip]`: skip quotas and notice
//! - `[billing]`: optional daemon cadence and consecutive failure policy
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Secrets may instead come from the environment; binaries pass them to
//! [`Config::with_secrets`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sync_core::SkipPolicy;
use sync_remote::HttpRemoteConfig;

use crate::error::{EngineError, Result};
use crate::retry::RetryPolicy;

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "storesync.toml";
/// Default database file name inside the state directory.
pub const DB_FILE_NAME: &str = "storesync.db";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub skip: SkipPolicy,
    #[serde(default)]
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file. Relative paths resolve against the state directory;
    /// unset means `<state dir>/storesync.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolve(&self, state_dir: &Path) -> PathBuf {
        match &self.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => state_dir.join(p),
            None => state_dir.join(DB_FILE_NAME),
        }
    }
}

/// Remote platform connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Prefer `STORESYNC_ACCESS_TOKEN` over storing the token here.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 429 responses retried in place by the client (default: 3).
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    /// Cap on a single Retry-After wait in seconds (default: 30).
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

fn default_base_url() -> String {
    HttpRemoteConfig::default().base_url
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

fn default_max_retry_after_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            base_url: default_base_url(),
            access_token: String::new(),
            timeout_secs: default_timeout_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            max_retry_after_secs: default_max_retry_after_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn http_config(&self) -> HttpRemoteConfig {
        HttpRemoteConfig {
            base_url: self.base_url.clone(),
            access_token: self.access_token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_rate_limit_retries: self.max_rate_limit_retries,
            max_retry_after: Duration::from_secs(self.max_retry_after_secs),
        }
    }
}

/// Push engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Worker threads per sweep (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Calls per push for transient failures, including the first (default: 4).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// How long a push that exhausted its attempts waits before the next sweep
    /// may try again (default: 60).
    #[serde(default = "default_requeue_delay_secs")]
    pub requeue_delay_secs: u64,
    /// Daemon sweep cadence (default: 30).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Queue items taken per sweep (default: 200).
    #[serde(default = "default_batch")]
    pub batch: usize,
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_requeue_delay_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_batch() -> usize {
    200
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            requeue_delay_secs: default_requeue_delay_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            batch: default_batch(),
        }
    }
}

impl PushConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_secs(self.max_delay_secs))
    }
}

/// Webhook listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared HMAC secret. Prefer `STORESYNC_WEBHOOK_SECRET`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    /// Deferrals before an event for an unknown record is orphaned (default: 10).
    #[serde(default = "default_max_deferrals")]
    pub max_deferrals: u32,
    /// Daemon cadence for retrying deferred events (default: 60).
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_max_deferrals() -> u32 {
    10
}

fn default_retry_interval_secs() -> u64 {
    60
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            bind: default_bind(),
            secret: String::new(),
            max_deferrals: default_max_deferrals(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

/// What happens after repeated billing failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Keep retrying every run.
    #[default]
    None,
    Pause,
    Cancel,
}

impl FailureAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureAction::None => "none",
            FailureAction::Pause => "pause",
            FailureAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for FailureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(FailureAction::None),
            "pause" => Ok(FailureAction::Pause),
            "cancel" => Ok(FailureAction::Cancel),
            _ => Err(EngineError::Config(format!(
                "invalid failure_action '{s}' (expected none, pause or cancel)"
            ))),
        }
    }
}

/// Billing scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Daemon billing cadence in seconds. Unset leaves billing to cron.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub failure_action: FailureAction,
    /// Consecutive failures that trigger `failure_action` (default: 3).
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_max_consecutive_failures() -> u32 {
    3
}

impl Default for BillingConfig {
    fn default() -> Self {
        BillingConfig {
            interval_secs: None,
            failure_action: FailureAction::None,
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path)?;
        Config::parse(&text)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))
    }

    /// Override secrets supplied by the environment.
    pub fn with_secrets(
        mut self,
        access_token: Option<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            self.remote.access_token = token;
        }
        if let Some(secret) = webhook_secret.filter(|s| !s.is_empty()) {
            self.webhook.secret = secret;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.push.workers == 0 {
            return Err(EngineError::Config("push.workers must be at least 1".into()));
        }
        if self.push.batch == 0 {
            return Err(EngineError::Config("push.batch must be at least 1".into()));
        }
        if self.billing.interval_secs == Some(0) {
            return Err(EngineError::Config(
                "billing.interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
