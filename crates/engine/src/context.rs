// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handles and the assembled engine.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sync_core::{Clock, Database, EntityKey, SystemClock};
use sync_remote::{HttpRemote, RemoteClient};

use crate::billing::BillingScheduler;
use crate::config::Config;
use crate::error::Result;
use crate::lifecycle::{FailurePolicy, Lifecycle};
use crate::locks::KeyedLocks;
use crate::push::PushEngine;
use crate::webhook::WebhookIngress;
use crate::writer::LocalWriter;

/// The local datastore shared between threads.
pub type Store = Arc<Mutex<Database>>;

/// Handles every component works through.
///
/// Lock order: an entity's key lock first, then the store. The store lock is
/// never held across a remote call.
#[derive(Clone)]
pub struct Context {
    pub store: Store,
    pub remote: Arc<dyn RemoteClient>,
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<KeyedLocks<EntityKey>>,
}

impl Context {
    pub fn new(db: Database, remote: Arc<dyn RemoteClient>, clock: Arc<dyn Clock>) -> Self {
        Context {
            store: Arc::new(Mutex::new(db)),
            remote,
            clock,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// All engine components wired to one context.
#[derive(Clone)]
pub struct Engine {
    pub context: Context,
    pub writer: LocalWriter,
    pub push: PushEngine,
    pub webhooks: WebhookIngress,
    pub lifecycle: Lifecycle,
    pub billing: BillingScheduler,
}

impl Engine {
    pub fn new(context: Context, config: &Config) -> Self {
        let push = PushEngine::new(context.clone(), &config.push);
        let writer = LocalWriter::new(context.clone(), push.clone());
        let lifecycle = Lifecycle::new(
            context.clone(),
            push.clone(),
            config.skip,
            FailurePolicy::from(&config.billing),
        );
        let webhooks = WebhookIngress::new(context.clone(), lifecycle.clone(), &config.webhook);
        let billing = BillingScheduler::new(lifecycle.clone());
        Engine {
            context,
            writer,
            push,
            webhooks,
            lifecycle,
            billing,
        }
    }

    /// Open the database at `db_path` and connect to the configured remote.
    ///
    /// The HTTP client is blocking; build it outside any async runtime.
    pub fn open(config: &Config, db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        let remote = HttpRemote::new(config.remote.http_config())?;
        let context = Context::new(db, Arc::new(remote), Arc::new(SystemClock));
        Ok(Engine::new(context, config))
    }
}
