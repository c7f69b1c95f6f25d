// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook ingress: remote change notifications into local state.
//!
//! An event is verified against the shared HMAC secret before anything is
//! read from it. Verified events are logged by event id, so a redelivery is
//! acknowledged without being applied again. Events for records not known
//! locally yet are deferred and replayed from the log; after too many
//! deferrals they are orphaned.
//!
//! Topics are `<resource>/<action>`:
//! - `customers/create`, `products/update`, `addresses/delete`, ... for
//!   generic records
//! - `subscription_contracts/update` and `subscription_contracts/cancel`
//! - `subscription_billing_attempts/success` and `.../failure`

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use sync_core::{
    EntityKind, Ledger, Merge, MergeOutcome, RemoteContractFields, StoredEvent,
    SubscriptionStatus, WebhookState,
};
use tracing::{debug, error, info, warn};

use crate::config::WebhookConfig;
use crate::context::Context;
use crate::error::Result;
use crate::lifecycle::{ChargeOutcome, Lifecycle};
use crate::locks::KeyedLocks;
use crate::serialize::localize_references;

/// Header carrying the base64 HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Hmac-Sha256";

const BILLING_RESOURCE: &str = "subscription_billing_attempts";

type HmacSha256 = Hmac<Sha256>;

/// Base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Constant-time check of `signature` against `body`.
///
/// An empty secret verifies nothing.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Body of a webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event_id: String,
    pub topic: String,
    pub remote_id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

/// What happened to one delivery. Maps to the HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    Applied { detail: String },
    /// The event id was seen before.
    Duplicate,
    /// The record is not known yet; the event will be replayed.
    Deferred { deferrals: u32 },
    /// Deferred too often; given up.
    Orphaned,
    /// Verified but nothing to do.
    Ignored { reason: String },
    /// Signature missing or wrong.
    Rejected,
    /// Verified but not a decodable envelope.
    Malformed { error: String },
}

impl IngressOutcome {
    /// Only an unauthenticated delivery is refused. A verified body the
    /// engine cannot decode is acknowledged so the sender stops redelivering
    /// it; the failure is logged.
    pub fn http_status(&self) -> u16 {
        match self {
            IngressOutcome::Rejected => 401,
            _ => 200,
        }
    }
}

/// Tally of one replay of deferred events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replayed: usize,
    pub applied: usize,
    pub deferred: usize,
    pub orphaned: usize,
    pub ignored: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Delete,
    Cancel,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Entity(EntityKind, Action),
    Contract(Action),
    Billing(Action),
}

fn parse_topic(topic: &str) -> Option<Topic> {
    let (resource, action) = topic.split_once('/')?;
    let action = match action {
        "create" => Action::Create,
        "update" => Action::Update,
        "delete" => Action::Delete,
        "cancel" => Action::Cancel,
        "success" => Action::Success,
        "failure" => Action::Failure,
        _ => return None,
    };
    if resource == BILLING_RESOURCE {
        return matches!(action, Action::Success | Action::Failure).then_some(Topic::Billing(action));
    }
    match EntityKind::from_resource(resource)? {
        EntityKind::SubscriptionContract => {
            matches!(action, Action::Update | Action::Cancel).then_some(Topic::Contract(action))
        }
        kind => matches!(action, Action::Create | Action::Update | Action::Delete)
            .then_some(Topic::Entity(kind, action)),
    }
}

/// Result of applying a verified event.
enum Applied {
    Done(String),
    Unresolved(String),
    Skipped(String),
}

fn describe(outcome: &MergeOutcome) -> String {
    let join = |set: &std::collections::BTreeSet<String>| {
        set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    };
    let mut parts = vec![format!("applied [{}]", join(&outcome.applied))];
    if !outcome.stale.is_empty() {
        parts.push(format!("stale [{}]", join(&outcome.stale)));
    }
    if !outcome.rejected.is_empty() {
        parts.push(format!("rejected [{}]", join(&outcome.rejected)));
    }
    parts.join(" ")
}

fn timestamp_field(fields: &BTreeMap<String, Value>, name: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| format!("{name}: {e}")),
        Some(other) => Err(format!("{name}: expected a timestamp, got {other}")),
    }
}

fn contract_fields(
    action: Action,
    fields: &BTreeMap<String, Value>,
) -> std::result::Result<RemoteContractFields, String> {
    let status = if action == Action::Cancel {
        Some(SubscriptionStatus::Cancelled)
    } else {
        match fields.get("status").and_then(Value::as_str) {
            Some(s) => Some(s.parse::<SubscriptionStatus>().map_err(|e| e.to_string())?),
            None => None,
        }
    };
    Ok(RemoteContractFields {
        status,
        next_billing_at: timestamp_field(fields, "next_billing_at")?,
        next_delivery_at: timestamp_field(fields, "next_delivery_at")?,
    })
}

/// Verifies, logs and applies webhook deliveries.
#[derive(Clone)]
pub struct WebhookIngress {
    ctx: Context,
    lifecycle: Lifecycle,
    secret: Arc<str>,
    max_deferrals: u32,
    remote_locks: Arc<KeyedLocks<(EntityKind, String)>>,
}

impl WebhookIngress {
    pub fn new(ctx: Context, lifecycle: Lifecycle, config: &WebhookConfig) -> Self {
        WebhookIngress {
            ctx,
            lifecycle,
            secret: Arc::from(config.secret.as_str()),
            max_deferrals: config.max_deferrals,
            remote_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Returns false when no secret is configured; every delivery is then
    /// rejected.
    pub fn has_secret(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Handle one delivery.
    ///
    /// `Err` means the local store failed; the sender should retry.
    pub fn handle(&self, body: &[u8], signature: Option<&str>) -> Result<IngressOutcome> {
        let verified = signature.is_some_and(|s| verify_signature(&self.secret, body, s));
        if !verified {
            error!(
                signed = signature.is_some(),
                bytes = body.len(),
                "webhook signature verification failed"
            );
            return Ok(IngressOutcome::Rejected);
        }

        let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "verified webhook body is not an event");
                return Ok(IngressOutcome::Malformed {
                    error: e.to_string(),
                });
            }
        };

        let prior = self
            .ctx
            .store
            .lock()
            .get_webhook_event(&envelope.event_id)?;
        let (deferrals, received_at) = match prior {
            Some(event) if event.state != WebhookState::Deferred => {
                debug!(event_id = %envelope.event_id, "duplicate delivery");
                return Ok(IngressOutcome::Duplicate);
            }
            Some(event) => (event.deferrals, Some(event.received_at)),
            None => (0, None),
        };

        let payload = String::from_utf8_lossy(body).into_owned();
        self.apply_and_log(&envelope, payload, deferrals, received_at)
    }

    /// Replay every deferred event from the log.
    pub fn retry_deferred(&self) -> Result<ReplayReport> {
        let events = self.ctx.store.lock().deferred_webhook_events()?;
        let mut report = ReplayReport::default();
        for event in events {
            report.replayed += 1;
            let envelope: WebhookEnvelope = match serde_json::from_str(&event.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(event_id = %event.event_id, error = %e, "logged event unreadable, orphaned");
                    self.log_event(StoredEvent {
                        state: WebhookState::Orphaned,
                        detail: Some(e.to_string()),
                        updated_at: self.ctx.now(),
                        ..event
                    })?;
                    report.orphaned += 1;
                    continue;
                }
            };
            match self.apply_and_log(&envelope, event.payload, event.deferrals, Some(event.received_at))? {
                IngressOutcome::Applied { .. } => report.applied += 1,
                IngressOutcome::Deferred { .. } => report.deferred += 1,
                IngressOutcome::Orphaned => report.orphaned += 1,
                _ => report.ignored += 1,
            }
        }
        if report.replayed > 0 {
            info!(
                replayed = report.replayed,
                applied = report.applied,
                deferred = report.deferred,
                orphaned = report.orphaned,
                "deferred webhooks replayed"
            );
        }
        Ok(report)
    }

    fn apply_and_log(
        &self,
        envelope: &WebhookEnvelope,
        payload: String,
        deferrals: u32,
        received_at: Option<DateTime<Utc>>,
    ) -> Result<IngressOutcome> {
        let applied = self.apply(envelope)?;
        let event_id = envelope.event_id.as_str();
        let topic = envelope.topic.as_str();

        let (state, deferrals, detail, outcome) = match applied {
            Applied::Done(detail) => {
                info!(event_id, topic, remote_id = %envelope.remote_id, %detail, "webhook applied");
                (
                    WebhookState::Applied,
                    deferrals,
                    detail.clone(),
                    IngressOutcome::Applied { detail },
                )
            }
            Applied::Skipped(reason) => {
                debug!(event_id, topic, %reason, "webhook ignored");
                (
                    WebhookState::Ignored,
                    deferrals,
                    reason.clone(),
                    IngressOutcome::Ignored { reason },
                )
            }
            Applied::Unresolved(reason) => {
                let deferrals = deferrals + 1;
                if deferrals > self.max_deferrals {
                    error!(event_id, topic, deferrals, %reason, "webhook orphaned");
                    (WebhookState::Orphaned, deferrals, reason, IngressOutcome::Orphaned)
                } else {
                    warn!(event_id, topic, deferrals, %reason, "webhook deferred");
                    (
                        WebhookState::Deferred,
                        deferrals,
                        reason,
                        IngressOutcome::Deferred { deferrals },
                    )
                }
            }
        };

        let now = self.ctx.now();
        self.log_event(StoredEvent {
            event_id: envelope.event_id.clone(),
            topic: envelope.topic.clone(),
            remote_id: envelope.remote_id.clone(),
            occurred_at: envelope.occurred_at,
            payload,
            state,
            deferrals,
            detail: Some(detail),
            received_at: received_at.unwrap_or(now),
            updated_at: now,
        })?;
        Ok(outcome)
    }

    fn log_event(&self, event: StoredEvent) -> Result<()> {
        self.ctx.store.lock().record_webhook_event(&event)?;
        Ok(())
    }

    fn apply(&self, envelope: &WebhookEnvelope) -> Result<Applied> {
        match parse_topic(&envelope.topic) {
            Some(Topic::Entity(kind, action)) => self.apply_entity(kind, action, envelope),
            Some(Topic::Contract(action)) => self.apply_contract(action, envelope),
            Some(Topic::Billing(action)) => self.apply_billing(action, envelope),
            None => Ok(Applied::Skipped(format!(
                "unhandled topic {}",
                envelope.topic
            ))),
        }
    }

    fn apply_entity(
        &self,
        kind: EntityKind,
        action: Action,
        envelope: &WebhookEnvelope,
    ) -> Result<Applied> {
        let remote_id = envelope.remote_id.as_str();
        let _remote_guard = self.remote_locks.lock(&(kind, remote_id.to_string()));
        let known = self.ctx.store.lock().key_for_remote_id(kind, remote_id)?;

        let Some(key) = known else {
            return match action {
                Action::Create => self.insert_remote(kind, envelope),
                _ => Ok(Applied::Unresolved(format!("unknown {kind} {remote_id}"))),
            };
        };

        let _guard = self.ctx.locks.lock(&key);
        let db = self.ctx.store.lock();
        let now = self.ctx.now();
        if action == Action::Delete {
            return Ok(Applied::Done(if db.tombstone_remote(key, now)? {
                format!("{key} tombstoned")
            } else {
                format!("{key} already tombstoned")
            }));
        }

        let mut fields = envelope.fields.clone();
        let unknown = localize_references(&db, kind, &mut fields)?;
        if let Some((parent, id)) = unknown.first() {
            return Ok(Applied::Unresolved(format!("unknown parent {parent} {id}")));
        }
        match db.merge_remote_fields(key, &fields, envelope.occurred_at, now) {
            Ok(outcome) => Ok(Applied::Done(format!("{key} {}", describe(&outcome)))),
            Err(sync_core::Error::EntityDeleted(_)) => {
                Ok(Applied::Skipped(format!("{key} is tombstoned")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a record created on the remote side.
    ///
    /// A local record with the same code but no remote id yet is probably
    /// our own create in flight; the event waits until that push lands.
    /// A code already bound to another remote record is left alone.
    fn insert_remote(&self, kind: EntityKind, envelope: &WebhookEnvelope) -> Result<Applied> {
        let db = self.ctx.store.lock();
        if let Some(code) = envelope.code.as_deref() {
            if let Some(local) = db.find_entity_by_code(kind, code)? {
                let assigned = db
                    .find_sync_state(local.key)?
                    .is_some_and(|state| state.has_remote_id());
                return Ok(if assigned {
                    Applied::Skipped(format!("code {code} already held by {}", local.key))
                } else {
                    Applied::Unresolved(format!("{} with code {code} awaits its remote id", local.key))
                });
            }
        }

        let mut fields = envelope.fields.clone();
        fields.remove("code");
        let unknown = localize_references(&db, kind, &mut fields)?;
        if let Some((parent, id)) = unknown.first() {
            return Ok(Applied::Unresolved(format!("unknown parent {parent} {id}")));
        }
        let entity = db.insert_remote_entity(
            kind,
            &envelope.remote_id,
            envelope.code.as_deref(),
            &fields,
            envelope.occurred_at,
            self.ctx.now(),
        )?;
        Ok(Applied::Done(format!("{} created from remote", entity.key)))
    }

    fn apply_contract(&self, action: Action, envelope: &WebhookEnvelope) -> Result<Applied> {
        let kind = EntityKind::SubscriptionContract;
        let remote_id = envelope.remote_id.as_str();
        let _remote_guard = self.remote_locks.lock(&(kind, remote_id.to_string()));
        let Some(key) = self.ctx.store.lock().key_for_remote_id(kind, remote_id)? else {
            return Ok(Applied::Unresolved(format!("unknown {kind} {remote_id}")));
        };
        let fields = match contract_fields(action, &envelope.fields) {
            Ok(fields) => fields,
            Err(reason) => return Ok(Applied::Skipped(format!("bad contract fields: {reason}"))),
        };

        let _guard = self.ctx.locks.lock(&key);
        let db = self.ctx.store.lock();
        let outcome =
            db.merge_remote_contract(key.local_id, &fields, envelope.occurred_at, self.ctx.now())?;
        if !outcome.rejected.is_empty() {
            warn!(%key, rejected = ?outcome.rejected, "remote contract change refused");
        }
        Ok(Applied::Done(format!("{key} {}", describe(&outcome))))
    }

    fn apply_billing(&self, action: Action, envelope: &WebhookEnvelope) -> Result<Applied> {
        let Some(idempotency_key) = envelope
            .fields
            .get("idempotency_key")
            .and_then(Value::as_str)
        else {
            return Ok(Applied::Skipped("no idempotency_key".to_string()));
        };
        let attempt = self.ctx.store.lock().live_billing_attempt(idempotency_key)?;
        let Some(attempt) = attempt else {
            return Ok(Applied::Skipped(format!(
                "no open attempt for {idempotency_key}"
            )));
        };

        let text = |name: &str| envelope.fields.get(name).and_then(Value::as_str);
        let outcome = if action == Action::Success {
            self.lifecycle
                .record_charge_success(attempt.id, text("order_id"))?
        } else {
            self.lifecycle.record_charge_failure(
                attempt.id,
                text("error_message").unwrap_or("charge declined"),
            )?
        };
        Ok(match outcome {
            ChargeOutcome::AlreadySettled => {
                Applied::Skipped(format!("attempt {} already settled", attempt.id))
            }
            ChargeOutcome::Succeeded { .. } => {
                Applied::Done(format!("attempt {} succeeded", attempt.id))
            }
            _ => Applied::Done(format!("attempt {} failed", attempt.id)),
        })
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
