// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic background work: push sweeps, deferred webhook replay and
//! scheduled billing runs.
//!
//! Engine calls block, so every tick runs on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sync_engine::{acquire_billing_lock, Config, Engine, EngineError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Spawn every periodic task. They stop when `shutdown` flips to true.
pub fn spawn_all(
    engine: &Engine,
    config: &Config,
    state_dir: PathBuf,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    let push = engine.push.clone();
    tasks.push(tokio::spawn(every(
        Duration::from_secs(config.push.sweep_interval_secs.max(1)),
        "push-sweep",
        shutdown.clone(),
        move || match push.sweep() {
            Ok(report) if report.attempted > 0 => info!(?report, "push sweep finished"),
            Ok(_) => debug!("push queue empty"),
            Err(e) => error!(error = %e, "push sweep failed"),
        },
    )));

    let webhooks = engine.webhooks.clone();
    tasks.push(tokio::spawn(every(
        Duration::from_secs(config.webhook.retry_interval_secs.max(1)),
        "webhook-replay",
        shutdown.clone(),
        move || match webhooks.retry_deferred() {
            Ok(report) if report.replayed > 0 => info!(?report, "replayed deferred webhooks"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "webhook replay failed"),
        },
    )));

    if let Some(secs) = config.billing.interval_secs {
        let engine = engine.clone();
        let state_dir = Arc::new(state_dir);
        tasks.push(tokio::spawn(every(
            Duration::from_secs(secs),
            "billing",
            shutdown,
            move || run_billing(&engine, &state_dir),
        )));
    } else {
        debug!("scheduled billing disabled");
    }

    tasks
}

fn run_billing(engine: &Engine, state_dir: &std::path::Path) {
    let _lock = match acquire_billing_lock(state_dir) {
        Ok(lock) => lock,
        Err(EngineError::BillingBusy) => {
            warn!("billing run skipped; another run holds the lock");
            return;
        }
        Err(e) => {
            error!(error = %e, "failed to take the billing lock");
            return;
        }
    };
    match engine.billing.run_due(engine.context.now()) {
        Ok(report) if report.due > 0 => info!(?report, "billing run finished"),
        Ok(_) => debug!("no subscriptions due"),
        Err(e) => error!(error = %e, "billing run failed"),
    }
}

async fn every<F>(
    period: Duration,
    name: &'static str,
    mut shutdown: watch::Receiver<bool>,
    work: F,
) where
    F: Fn() + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
        let job = Arc::clone(&work);
        if let Err(e) = tokio::task::spawn_blocking(move || job()).await {
            error!(task = name, error = %e, "periodic task aborted");
        }
    }
    debug!(task = name, "periodic task stopped");
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
