// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

//! Test infrastructure for command testing without a state directory.
//!
//! `TestContext` wires an engine to an in-memory database, a scripted
//! remote and a manual clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sync_core::{
    BillingInterval, ChangeSet, Database, EntityKey, EntityKind, LineItem, ManualClock,
    NewSubscription, SubscriptionContract,
};
use sync_engine::mock::MockRemote;
use sync_engine::webhook::sign;
use sync_engine::{Config, Context, Engine, IngressOutcome};

pub const SECRET: &str = "whsec_cli";

pub struct TestContext {
    pub engine: Engine,
    pub remote: Arc<MockRemote>,
    pub clock: Arc<ManualClock>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.push.initial_delay_ms = 0;
        config.push.max_delay_secs = 0;
        config.webhook.secret = SECRET.to_string();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        ));
        let remote = Arc::new(MockRemote::new());
        let context = Context::new(
            Database::open_in_memory().unwrap(),
            remote.clone(),
            clock.clone(),
        );
        TestContext {
            engine: Engine::new(context, &config),
            remote,
            clock,
        }
    }

    /// Create locally without pushing.
    pub fn create(&self, kind: EntityKind, code: Option<&str>, fields: ChangeSet) -> EntityKey {
        self.engine.writer.create(kind, code, fields).unwrap().key
    }

    /// Create and push.
    pub fn synced(&self, kind: EntityKind, code: Option<&str>, fields: ChangeSet) -> EntityKey {
        let key = self.create(kind, code, fields);
        assert!(self.engine.push.push(key).unwrap().is_success());
        key
    }

    /// An active, pushed monthly contract for a fresh customer.
    pub fn subscription(&self, first_billing: DateTime<Utc>) -> SubscriptionContract {
        let customer = self.synced(
            EntityKind::Customer,
            Some("ada@example.com"),
            ChangeSet::new().set("email", "ada@example.com"),
        );
        let address = self.synced(
            EntityKind::Address,
            None,
            ChangeSet::new().set("customer_id", customer.local_id),
        );
        let product = self.synced(EntityKind::Product, None, ChangeSet::new().set("title", "Tea"));
        let variant = self.synced(
            EntityKind::ProductVariant,
            None,
            ChangeSet::new().set("product_id", product.local_id),
        );
        let plan = self.synced(EntityKind::SellingPlan, None, ChangeSet::new().set("name", "Monthly"));
        self.engine
            .lifecycle
            .create_subscription(&NewSubscription {
                customer_id: customer.local_id,
                selling_plan_id: plan.local_id,
                first_billing_at: first_billing,
                first_delivery_at: first_billing + Duration::days(2),
                interval: BillingInterval::monthly(),
                line_items: vec![LineItem {
                    variant_id: variant.local_id,
                    quantity: 1,
                    unit_price_cents: 1500,
                }],
                delivery_address_id: address.local_id,
                payment_method_ref: None,
            })
            .unwrap()
    }

    /// Deliver a signed webhook event.
    pub fn deliver(&self, event: &serde_json::Value) -> IngressOutcome {
        let body = serde_json::to_vec(event).unwrap();
        self.engine
            .webhooks
            .handle(&body, Some(&sign(SECRET, &body)))
            .unwrap()
    }
}

pub fn day(year: i32, month: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, d, 0, 0, 0).unwrap()
}

#[test]
fn test_context_builds_an_active_subscription() {
    let ctx = TestContext::new();
    let contract = ctx.subscription(day(2025, 2, 1));
    assert_eq!(contract.status, sync_core::SubscriptionStatus::Active);
}
