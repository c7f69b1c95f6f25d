// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::MutexGuard;
use serde_json::Value;
use sync_core::{
    BillingInterval, ChangeSet, Database, EntityKey, EntityKind, Ledger, LineItem, ManualClock,
    NewSubscription, SubscriptionContract, SubscriptionStatus,
};
use sync_remote::RemoteClient;

use crate::config::Config;
use crate::context::{Context, Engine};
use crate::mock::MockRemote;
use crate::webhook::sign;

/// Unix time the harness clock starts at.
pub const START: i64 = 1_700_000_000;

pub const SECRET: &str = "whsec_test";

pub fn day(year: i32, month: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, d, 0, 0, 0).unwrap()
}

/// Config with no retry delays and a webhook secret.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.push.initial_delay_ms = 0;
    config.push.max_delay_secs = 0;
    config.push.workers = 2;
    config.webhook.secret = SECRET.to_string();
    config
}

/// Records a contract can point at, all pushed.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    pub customer: EntityKey,
    pub address: EntityKey,
    pub product: EntityKey,
    pub variant: EntityKey,
    pub plan: EntityKey,
}

pub struct Harness {
    pub engine: Engine,
    pub remote: Arc<MockRemote>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Harness::with(test_config(), MockRemote::new())
    }

    pub fn with_remote(remote: MockRemote) -> Self {
        Harness::with(test_config(), remote)
    }

    pub fn with(config: Config, remote: MockRemote) -> Self {
        Harness::wrapping(config, remote, |mock| mock as Arc<dyn RemoteClient>)
    }

    /// Harness whose engine talks to `wrap(mock)` instead of the mock itself.
    pub fn wrapping<F>(config: Config, remote: MockRemote, wrap: F) -> Self
    where
        F: FnOnce(Arc<MockRemote>) -> Arc<dyn RemoteClient>,
    {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(START, 0).unwrap()));
        let remote = Arc::new(remote);
        let db = Database::open_in_memory().unwrap();
        let context = Context::new(db, wrap(remote.clone()), clock.clone());
        Harness {
            engine: Engine::new(context, &config),
            remote,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.engine.context.now()
    }

    pub fn set_now(&self, at: DateTime<Utc>) {
        self.clock.set(at);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    pub fn store(&self) -> MutexGuard<'_, Database> {
        self.engine.context.store.lock()
    }

    /// Create locally without pushing.
    pub fn create(&self, kind: EntityKind, code: Option<&str>, fields: ChangeSet) -> EntityKey {
        self.engine.writer.create(kind, code, fields).unwrap().key
    }

    /// Create and push; panics unless the push succeeds.
    pub fn synced(&self, kind: EntityKind, code: Option<&str>, fields: ChangeSet) -> EntityKey {
        let key = self.create(kind, code, fields);
        let outcome = self.engine.push.push(key).unwrap();
        assert!(outcome.is_success(), "push of {key} gave {outcome:?}");
        key
    }

    pub fn remote_id(&self, key: EntityKey) -> Option<String> {
        self.store().sync_state(key).unwrap().remote_id
    }

    pub fn catalog(&self) -> Catalog {
        let customer = self.synced(
            EntityKind::Customer,
            Some("ada@example.com"),
            ChangeSet::new().set("email", "ada@example.com").set("name", "Ada"),
        );
        let address = self.synced(
            EntityKind::Address,
            None,
            ChangeSet::new()
                .set("customer_id", customer.local_id)
                .set("line1", "1 Loop Road"),
        );
        let product = self.synced(
            EntityKind::Product,
            Some("coffee"),
            ChangeSet::new().set("title", "Coffee"),
        );
        let variant = self.synced(
            EntityKind::ProductVariant,
            Some("COFFEE-250G"),
            ChangeSet::new()
                .set("product_id", product.local_id)
                .set("price_cents", 1200),
        );
        let plan = self.synced(
            EntityKind::SellingPlan,
            Some("monthly"),
            ChangeSet::new().set("name", "Monthly"),
        );
        Catalog {
            customer,
            address,
            product,
            variant,
            plan,
        }
    }

    pub fn new_subscription(&self, catalog: &Catalog, first_billing: DateTime<Utc>) -> NewSubscription {
        NewSubscription {
            customer_id: catalog.customer.local_id,
            selling_plan_id: catalog.plan.local_id,
            first_billing_at: first_billing,
            first_delivery_at: first_billing + Duration::days(2),
            interval: BillingInterval::monthly(),
            line_items: vec![LineItem {
                variant_id: catalog.variant.local_id,
                quantity: 2,
                unit_price_cents: 1200,
            }],
            delivery_address_id: catalog.address.local_id,
            payment_method_ref: None,
        }
    }

    /// An ACTIVE, pushed contract billing first at `first_billing`.
    pub fn subscription(&self, catalog: &Catalog, first_billing: DateTime<Utc>) -> SubscriptionContract {
        let contract = self
            .engine
            .lifecycle
            .create_subscription(&self.new_subscription(catalog, first_billing))
            .unwrap();
        assert_eq!(contract.status, SubscriptionStatus::Active);
        contract
    }

    /// Signed webhook body for `event`.
    pub fn signed(&self, event: &Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(event).unwrap();
        let signature = sign(SECRET, &body);
        (body, signature)
    }
}
