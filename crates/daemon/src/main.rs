// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! storesyncd - The storesync daemon.
//!
//! Owns the local datastore under `~/.local/state/storesync/`, receives
//! store webhooks over HTTP, and runs the push sweep, deferred webhook
//! replay and scheduled billing in the background.
//!
//! Usage:
//!   storesyncd [--state-dir <path>] [--config <path>]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sync_engine::{Config, Engine, CONFIG_FILE_NAME};
use tokio::sync::watch;

mod env;
mod server;
mod tasks;

/// PID filename within the state directory.
const PID_NAME: &str = "daemon.pid";
/// Lock filename for single instance guarantee.
const LOCK_NAME: &str = "daemon.lock";
/// How long in-flight blocking work may take to finish after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let state_dir = parse_state_dir(&args);
    if let Err(e) = fs::create_dir_all(&state_dir) {
        eprintln!("failed to create {}: {e}", state_dir.display());
        std::process::exit(1);
    }

    let log_path = state_dir.join("daemon.log");
    setup_logging(&log_path);

    tracing::info!("storesyncd starting, state_dir={}", state_dir.display());

    let config_path = parse_config_path(&args, &state_dir);
    let config = match Config::load(&config_path) {
        Ok(config) => config.with_secrets(env::access_token(), env::webhook_secret()),
        Err(e) => {
            tracing::error!("failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Acquire file lock for single instance
    let lock_path = state_dir.join(LOCK_NAME);
    let lock_file = match acquire_lock(&lock_path) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("failed to acquire lock: {}", e);
            std::process::exit(1);
        }
    };

    let pid_path = state_dir.join(PID_NAME);
    if let Err(e) = write_pid_file(&pid_path) {
        tracing::error!("failed to write PID file: {}", e);
        std::process::exit(1);
    }

    // The remote client blocks, so it is built before the runtime exists.
    let db_path = config.database.resolve(&state_dir);
    let engine = match Engine::open(&config, &db_path) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("failed to open engine: {}", e);
            cleanup(&pid_path);
            std::process::exit(1);
        }
    };
    if !engine.webhooks.has_secret() {
        tracing::warn!("no webhook secret configured; every delivery will be rejected");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {}", e);
            cleanup(&pid_path);
            std::process::exit(1);
        }
    };

    // The last engine handle is released here, outside the runtime.
    let served = runtime.block_on(serve(engine.clone(), &config, state_dir));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    drop(engine);

    cleanup(&pid_path);
    drop(lock_file);
    match served {
        Ok(()) => tracing::info!("storesyncd stopped"),
        Err(e) => {
            tracing::error!("server error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn serve(engine: Engine, config: &Config, state_dir: PathBuf) -> std::io::Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let background = tasks::spawn_all(&engine, config, state_dir, stop_rx);

    let listener = tokio::net::TcpListener::bind(&config.webhook.bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    // Signal readiness to parent process
    println!("READY");
    let _ = std::io::stdout().flush();

    let app = server::router(server::AppState::new(engine.clone()));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("shutting down");
    engine.push.shutdown();
    let _ = stop_tx.send(true);
    for task in background {
        let _ = task.await;
    }
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
}

fn parse_state_dir(args: &[String]) -> PathBuf {
    if let Some(dir) = flag_value(args, "--state-dir") {
        return PathBuf::from(dir);
    }
    // Default to XDG state directory
    if let Some(dir) = env::state_dir() {
        return dir;
    }
    if let Some(dir) = env::xdg_state_home() {
        return dir.join("storesync");
    }
    dirs::home_dir()
        .map(|h| h.join(".local/state/storesync"))
        .unwrap_or_else(|| PathBuf::from(".local/state/storesync"))
}

fn parse_config_path(args: &[String], state_dir: &Path) -> PathBuf {
    if let Some(path) = flag_value(args, "--config") {
        return PathBuf::from(path);
    }
    env::config_path().unwrap_or_else(|| state_dir.join(CONFIG_FILE_NAME))
}

fn setup_logging(log_path: &Path) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to open log file, fall back to stderr
    if let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn acquire_lock(lock_path: &Path) -> std::io::Result<fs::File> {
    use fs2::FileExt;

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| std::io::Error::other("another daemon instance is already running"))?;
    Ok(file)
}

fn write_pid_file(pid_path: &Path) -> std::io::Result<()> {
    fs::write(pid_path, format!("{}", std::process::id()))
}

fn cleanup(pid_path: &Path) {
    let _ = fs::remove_file(pid_path);
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
