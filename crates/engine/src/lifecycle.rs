// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription lifecycle manager.
//!
//! States: DRAFT → ACTIVE ⇄ PAUSED, and CANCELLED (terminal) from any
//! non-terminal state. Local changes are pushed as contract updates; a
//! cancel goes to the remote first and only then changes local state.
//!
//! Skips are checked against [`SkipPolicy`]:
//! - the request comes at least `advance_notice_days` before the billing date
//! - confirmed skips in the calendar year of the skipped date stay under
//!   `max_skips_per_period`
//! - confirmed skips since the last successful billing stay under
//!   `max_consecutive_skips`
//!
//! An accepted skip is confirmed immediately and advances both dates by one
//! interval.
//!
//! Billing attempts are also settled here, whether the outcome comes from the
//! charge call or a later webhook.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use sync_core::subscription::CONTRACT_FIELD_STATUS;
use sync_core::{
    billing_idempotency_key, cycle_changes, placeholder_remote_id, AttemptStatus, BillingAttempt,
    ChangeSet, EntityKey, FailureKind, Ledger, NewSubscription, Origin, SkipPolicy, SkipRecord,
    SubscriptionContract, SubscriptionStatus, SyncState,
};
use sync_remote::{BillingAttemptRequest, ChargeStatus};
use tracing::{debug, info, warn};

use crate::config::{BillingConfig, FailureAction};
use crate::context::Context;
use crate::error::{EngineError, PolicyViolation, Result};
use crate::push::{PushEngine, PushOutcome};
use crate::serialize::{contract_dependencies, unresolved};

/// What to do after repeated billing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    pub action: FailureAction,
    pub max_consecutive_failures: u32,
}

impl From<&BillingConfig> for FailurePolicy {
    fn from(config: &BillingConfig) -> Self {
        FailurePolicy {
            action: config.failure_action,
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::from(&BillingConfig::default())
    }
}

/// Result of charging, or settling the charge of, one billing cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChargeOutcome {
    Succeeded {
        attempt_id: i64,
        order_ref: Option<String>,
    },
    Failed {
        attempt_id: i64,
        error: String,
        consecutive_failures: usize,
    },
    /// Accepted remotely; settles by webhook.
    Pending { attempt_id: i64 },
    /// A pending or successful attempt already holds the cycle's key.
    AlreadyAttempted { idempotency_key: String },
    /// The attempt was settled before.
    AlreadySettled,
    /// The contract has no remote id yet.
    NotSynced,
    /// The contract is not active.
    Inactive,
}

/// Everything an operator needs about one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub contract: SubscriptionContract,
    pub sync: Option<SyncState>,
    pub skips: Vec<SkipRecord>,
    pub attempts: Vec<BillingAttempt>,
    /// Failed attempts for the current cycle.
    pub failures_this_cycle: usize,
}

fn status_change(status: SubscriptionStatus) -> ChangeSet {
    ChangeSet::new().set(CONTRACT_FIELD_STATUS, status.as_str())
}

/// A transient failure leaves a sent create's fate unknown.
fn create_may_have_landed(state: &SyncState) -> bool {
    state.last_error_kind == Some(FailureKind::Transient)
}

/// Idempotency key of the remote cancel of a contract.
pub fn cancel_idempotency_key(subscription_id: i64) -> String {
    format!("cancel-sub-{subscription_id}")
}

#[derive(Clone)]
pub struct Lifecycle {
    ctx: Context,
    push: PushEngine,
    skip_policy: SkipPolicy,
    failure_policy: FailurePolicy,
}

impl Lifecycle {
    pub fn new(
        ctx: Context,
        push: PushEngine,
        skip_policy: SkipPolicy,
        failure_policy: FailurePolicy,
    ) -> Self {
        Lifecycle {
            ctx,
            push,
            skip_policy,
            failure_policy,
        }
    }

    pub fn skip_policy(&self) -> &SkipPolicy {
        &self.skip_policy
    }

    /// Create a contract and push it.
    ///
    /// Fails fast, writing nothing, unless the customer, selling plan,
    /// delivery address and every variant already have real remote ids. A
    /// successful remote create moves the contract from DRAFT to ACTIVE; on
    /// any other push outcome it stays DRAFT and queued.
    pub fn create_subscription(&self, new: &NewSubscription) -> Result<SubscriptionContract> {
        let now = self.ctx.now();
        let key = {
            let db = self.ctx.store.lock();
            let deps = contract_dependencies(
                new.customer_id,
                new.selling_plan_id,
                new.delivery_address_id,
                &new.line_items,
            );
            let missing = unresolved(&db, &deps)?;
            if !missing.is_empty() {
                return Err(EngineError::Dependency { missing });
            }
            let contract = db.insert_subscription(new, SubscriptionStatus::Draft, now)?;
            let key = contract.key();
            db.register(key, Origin::LocalCreated, Some(&placeholder_remote_id(now)))?;
            let changes = cycle_changes(contract.next_billing_at, contract.next_delivery_at)
                .set(CONTRACT_FIELD_STATUS, contract.status.as_str());
            db.mark_dirty(key, &changes, "create", now)?;
            key
        };
        info!(%key, "subscription created");
        self.push_logged(key);
        Ok(self.ctx.store.lock().get_subscription(key.local_id)?)
    }

    /// Skip the next billing cycle, as requested at `at`.
    pub fn request_skip(
        &self,
        subscription_id: i64,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<SkipRecord> {
        let key = EntityKey::contract(subscription_id);
        let skip = {
            let _guard = self.ctx.locks.lock(&key);
            let db = self.ctx.store.lock();
            let now = self.ctx.now();
            let contract = db.get_subscription(subscription_id)?;
            let policy = self.skip_policy;

            if contract.status != SubscriptionStatus::Active {
                return Err(PolicyViolation::NotActive {
                    status: contract.status,
                }
                .into());
            }
            let cycle_key = billing_idempotency_key(subscription_id, contract.next_billing_at);
            if db.live_billing_attempt(&cycle_key)?.is_some() {
                return Err(PolicyViolation::CycleInFlight {
                    billing_at: contract.next_billing_at,
                }
                .into());
            }
            let notice = Duration::days(i64::from(policy.advance_notice_days));
            if contract.next_billing_at - at < notice {
                return Err(PolicyViolation::NoticeTooShort {
                    required_days: policy.advance_notice_days,
                    billing_at: contract.next_billing_at,
                }
                .into());
            }
            let year = contract.next_billing_at.year();
            if db.confirmed_skips_in_year(subscription_id, year)?
                >= policy.max_skips_per_period as usize
            {
                return Err(PolicyViolation::PeriodQuotaReached {
                    max: policy.max_skips_per_period,
                    year,
                }
                .into());
            }
            let since = db
                .last_successful_attempt(subscription_id)?
                .and_then(|a| a.completed_at);
            if db.confirmed_skips_since(subscription_id, since)?
                >= policy.max_consecutive_skips as usize
            {
                return Err(PolicyViolation::ConsecutiveLimitReached {
                    max: policy.max_consecutive_skips,
                }
                .into());
            }

            let (next_billing, next_delivery) = contract.next_cycle_dates()?;
            let confirmed = db.confirm_skip(
                subscription_id,
                contract.next_billing_at,
                next_billing,
                next_delivery,
                reason,
                policy.skip_fee_cents,
                now,
            )?;
            info!(
                %key,
                skipped = %contract.next_billing_at,
                next_billing = %next_billing,
                "billing cycle skipped"
            );
            confirmed
        };
        self.push_logged(key);
        Ok(skip)
    }

    /// Cancel a contract: remote first, then local.
    ///
    /// A remote failure leaves the local contract unchanged. A contract whose
    /// create may have reached the remote has the create replayed under its
    /// original idempotency key to learn the remote id before cancelling
    /// there. Only a contract that was never sent is cancelled locally and
    /// its create dropped.
    pub fn cancel(&self, subscription_id: i64) -> Result<SubscriptionContract> {
        let key = EntityKey::contract(subscription_id);
        let _guard = self.ctx.locks.lock(&key);
        let state = {
            let db = self.ctx.store.lock();
            let contract = db.get_subscription(subscription_id)?;
            contract
                .status
                .check_transition(SubscriptionStatus::Cancelled)?;
            db.find_sync_state(key)?
        };

        let mut remote_id = state
            .as_ref()
            .and_then(|s| s.real_remote_id().map(str::to_string));
        if remote_id.is_none() && state.as_ref().is_some_and(create_may_have_landed) {
            remote_id = self.replay_create(key)?;
        }

        if let Some(remote_id) = &remote_id {
            let idempotency_key = cancel_idempotency_key(subscription_id);
            let (result, _) = self
                .push
                .retry_policy()
                .run(self.push.cancel_flag(), || {
                    self.ctx.remote.cancel_contract(remote_id, &idempotency_key)
                });
            if let Err(e) = result {
                warn!(%key, error = %e, "remote cancel failed, contract unchanged");
                return Err(e.into());
            }
        }

        let db = self.ctx.store.lock();
        let now = self.ctx.now();
        let contract =
            db.set_subscription_status(subscription_id, SubscriptionStatus::Cancelled, now)?;
        if remote_id.is_some() {
            db.mark_pulled(key, now)?;
        } else {
            db.discard_push(key)?;
        }
        info!(%key, "subscription cancelled");
        Ok(contract)
    }

    /// Resend a create that failed in transit. Caller holds the key lock.
    ///
    /// Returns the remote id, or None if the remote rejected the create and
    /// so never stored it.
    fn replay_create(&self, key: EntityKey) -> Result<Option<String>> {
        info!(%key, "create may have reached the remote, replaying before cancel");
        match self.push.push_locked(key)? {
            PushOutcome::Created { remote_id } | PushOutcome::Adopted { remote_id } => {
                Ok(Some(remote_id))
            }
            PushOutcome::Parked { .. } => Ok(None),
            outcome => {
                warn!(%key, ?outcome, "create not confirmed, contract unchanged");
                Err(EngineError::UnconfirmedCreate {
                    key,
                    reason: format!("{outcome:?}"),
                })
            }
        }
    }

    /// ACTIVE → PAUSED, pushed as a contract update.
    pub fn pause(&self, subscription_id: i64) -> Result<SubscriptionContract> {
        self.transition(subscription_id, SubscriptionStatus::Active, SubscriptionStatus::Paused)
    }

    /// PAUSED → ACTIVE, pushed as a contract update.
    pub fn resume(&self, subscription_id: i64) -> Result<SubscriptionContract> {
        self.transition(subscription_id, SubscriptionStatus::Paused, SubscriptionStatus::Active)
    }

    fn transition(
        &self,
        subscription_id: i64,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<SubscriptionContract> {
        let key = EntityKey::contract(subscription_id);
        {
            let _guard = self.ctx.locks.lock(&key);
            let db = self.ctx.store.lock();
            let now = self.ctx.now();
            let current = db.get_subscription(subscription_id)?;
            if current.status != from {
                return Err(sync_core::Error::InvalidTransition {
                    from: current.status.to_string(),
                    to: to.to_string(),
                    valid_targets: current.status.valid_targets(),
                }
                .into());
            }
            db.set_subscription_status(subscription_id, to, now)?;
            db.mark_dirty(key, &status_change(to), to.as_str(), now)?;
            info!(%key, %from, %to, "subscription status changed");
        }
        self.push_logged(key);
        Ok(self.ctx.store.lock().get_subscription(subscription_id)?)
    }

    /// Charge the current cycle of an active contract.
    ///
    /// The PENDING attempt is inserted before the remote call; its
    /// idempotency key makes a second charge of the same cycle impossible.
    pub fn charge_cycle(&self, subscription_id: i64) -> Result<ChargeOutcome> {
        let key = EntityKey::contract(subscription_id);
        let (attempt, remote_id) = {
            let _guard = self.ctx.locks.lock(&key);
            let db = self.ctx.store.lock();
            let now = self.ctx.now();
            let contract = db.get_subscription(subscription_id)?;
            if contract.status != SubscriptionStatus::Active {
                return Ok(ChargeOutcome::Inactive);
            }
            let Some(remote_id) = db
                .find_sync_state(key)?
                .and_then(|s| s.real_remote_id().map(str::to_string))
            else {
                warn!(%key, "contract not on the remote yet, billing skipped");
                return Ok(ChargeOutcome::NotSynced);
            };
            let idempotency_key = billing_idempotency_key(subscription_id, contract.next_billing_at);
            match db.insert_billing_attempt(
                subscription_id,
                contract.next_billing_at,
                &idempotency_key,
                now,
            )? {
                Some(attempt) => (attempt, remote_id),
                None => {
                    debug!(%key, %idempotency_key, "cycle already attempted");
                    return Ok(ChargeOutcome::AlreadyAttempted { idempotency_key });
                }
            }
        };

        let request = BillingAttemptRequest {
            idempotency_key: attempt.idempotency_key.clone(),
            cycle_date: attempt.cycle_at.date_naive(),
        };
        let (result, _) = self.push.retry_policy().run(self.push.cancel_flag(), || {
            self.ctx.remote.create_billing_attempt(&remote_id, &request)
        });
        match result {
            Ok(charge) => match charge.status {
                ChargeStatus::Success => {
                    self.record_charge_success(attempt.id, charge.order_id.as_deref())
                }
                ChargeStatus::Failure => self.record_charge_failure(
                    attempt.id,
                    charge.error_message.as_deref().unwrap_or("charge declined"),
                ),
                ChargeStatus::Pending => {
                    info!(%key, attempt = attempt.id, "charge pending remotely");
                    Ok(ChargeOutcome::Pending {
                        attempt_id: attempt.id,
                    })
                }
            },
            Err(e) => self.record_charge_failure(attempt.id, &e.to_string()),
        }
    }

    /// Settle a PENDING attempt as SUCCESS and advance the contract dates.
    ///
    /// Dates move only if the contract still bills on the attempt's cycle.
    /// The settlement and the date move commit together.
    pub fn record_charge_success(
        &self,
        attempt_id: i64,
        order_ref: Option<&str>,
    ) -> Result<ChargeOutcome> {
        let subscription_id = self.ctx.store.lock().billing_attempt(attempt_id)?.subscription_id;
        let key = EntityKey::contract(subscription_id);
        let settled = {
            let _guard = self.ctx.locks.lock(&key);
            let db = self.ctx.store.lock();
            let now = self.ctx.now();
            db.record_billing_success(attempt_id, order_ref, now)?
        };
        let Some(settled) = settled else {
            return Ok(ChargeOutcome::AlreadySettled);
        };
        match settled.advanced_to {
            Some((next_billing, _)) => {
                info!(%key, attempt = attempt_id, next_billing = %next_billing, "billing succeeded");
                self.push_logged(key);
            }
            None => info!(%key, attempt = attempt_id, "billing succeeded for a past cycle"),
        }
        Ok(ChargeOutcome::Succeeded {
            attempt_id,
            order_ref: settled.attempt.remote_order_ref,
        })
    }

    /// Settle a PENDING attempt as FAILED and apply the failure policy.
    ///
    /// Dates are unchanged, so the next run retries the same cycle.
    pub fn record_charge_failure(&self, attempt_id: i64, error: &str) -> Result<ChargeOutcome> {
        let (attempt, consecutive) = {
            let db = self.ctx.store.lock();
            let now = self.ctx.now();
            let Some(attempt) = db.complete_billing_attempt(
                attempt_id,
                AttemptStatus::Failed,
                None,
                Some(error),
                now,
            )?
            else {
                return Ok(ChargeOutcome::AlreadySettled);
            };
            let consecutive = db.consecutive_billing_failures(attempt.subscription_id)?;
            (attempt, consecutive)
        };
        let key = EntityKey::contract(attempt.subscription_id);
        warn!(%key, attempt = attempt_id, consecutive, error, "billing failed");

        let policy = self.failure_policy;
        if policy.action != FailureAction::None
            && consecutive >= policy.max_consecutive_failures.max(1) as usize
        {
            let applied = match policy.action {
                FailureAction::Pause => self.pause(attempt.subscription_id).map(|_| ()),
                FailureAction::Cancel => self.cancel(attempt.subscription_id).map(|_| ()),
                FailureAction::None => Ok(()),
            };
            match applied {
                Ok(()) => warn!(%key, action = %policy.action, consecutive, "billing failure policy applied"),
                Err(e) => warn!(%key, action = %policy.action, error = %e, "billing failure policy not applied"),
            }
        }

        Ok(ChargeOutcome::Failed {
            attempt_id,
            error: error.to_string(),
            consecutive_failures: consecutive,
        })
    }

    /// Active contracts billing at or before `as_of`.
    pub fn due_subscriptions(&self, as_of: DateTime<Utc>) -> Result<Vec<SubscriptionContract>> {
        Ok(self.ctx.store.lock().due_subscriptions(as_of)?)
    }

    /// Contract, ledger, skips and attempts of one subscription.
    pub fn show(&self, subscription_id: i64) -> Result<SubscriptionView> {
        let db = self.ctx.store.lock();
        let contract = db.get_subscription(subscription_id)?;
        let key = billing_idempotency_key(subscription_id, contract.next_billing_at);
        Ok(SubscriptionView {
            sync: db.find_sync_state(contract.key())?,
            skips: db.list_skips(subscription_id)?,
            attempts: db.list_billing_attempts(subscription_id)?,
            failures_this_cycle: db.failed_attempts_for_key(&key)?,
            contract,
        })
    }

    fn push_logged(&self, key: EntityKey) {
        match self.push.push(key) {
            Ok(outcome) => debug!(%key, ?outcome, "contract push"),
            Err(e) => warn!(%key, error = %e, "contract push failed locally"),
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
