// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory remote platform for tests.
//!
//! [`MockRemote`] honours idempotency keys the way the real platform does:
//! replaying a create with a key it has seen returns the original record.
//! Failures can be scripted ahead of calls, and every call is recorded.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use sync_core::EntityKind;
use sync_remote::{
    BillingAttemptRequest, BillingAttemptResult, ChargeStatus, RemoteClient, RemoteError,
    RemoteRecord, RemoteResult,
};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create { kind: EntityKind, key: String },
    Update { kind: EntityKind, remote_id: String, key: String },
    FindByCode { kind: EntityKind, code: String },
    Cancel { remote_id: String, key: String },
    Charge { remote_id: String, key: String },
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    records: BTreeMap<(EntityKind, String), RemoteRecord>,
    creates_by_key: HashMap<String, RemoteRecord>,
    charges_by_key: HashMap<String, BillingAttemptResult>,
    failures: VecDeque<RemoteError>,
    charge_outcome: Option<(ChargeStatus, Option<String>)>,
    calls: Vec<MockCall>,
}

/// Scriptable in-memory [`RemoteClient`].
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    pub fn new() -> Self {
        MockRemote::with_next_id(1)
    }

    /// Start numbering remote ids at `id`.
    pub fn with_next_id(id: u64) -> Self {
        MockRemote {
            state: Mutex::new(MockState {
                next_id: id,
                ..MockState::default()
            }),
        }
    }

    /// Fail the next call with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, err: RemoteError) {
        self.state.lock().failures.push_back(err);
    }

    pub fn fail_next_n(&self, n: usize, err: RemoteError) {
        let mut state = self.state.lock();
        for _ in 0..n {
            state.failures.push_back(err.clone());
        }
    }

    /// Settle subsequent charges with `status` (default: success).
    pub fn set_charge_outcome(&self, status: ChargeStatus, error: Option<&str>) {
        self.state.lock().charge_outcome = Some((status, error.map(str::to_string)));
    }

    /// Seed a record that exists remotely before any push.
    pub fn insert_record(&self, kind: EntityKind, record: RemoteRecord) {
        self.state
            .lock()
            .records
            .insert((kind, record.id.clone()), record);
    }

    /// Delete a record remotely; later updates conflict.
    pub fn remove_record(&self, kind: EntityKind, remote_id: &str) -> Option<RemoteRecord> {
        self.state
            .lock()
            .records
            .remove(&(kind, remote_id.to_string()))
    }

    pub fn record(&self, kind: EntityKind, remote_id: &str) -> Option<RemoteRecord> {
        self.state
            .lock()
            .records
            .get(&(kind, remote_id.to_string()))
            .cloned()
    }

    pub fn records(&self, kind: EntityKind) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn create_calls(&self) -> Vec<MockCall> {
        self.calls_matching(|c| matches!(c, MockCall::Create { .. }))
    }

    pub fn update_calls(&self) -> Vec<MockCall> {
        self.calls_matching(|c| matches!(c, MockCall::Update { .. }))
    }

    pub fn charge_calls(&self) -> Vec<MockCall> {
        self.calls_matching(|c| matches!(c, MockCall::Charge { .. }))
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    fn calls_matching(&self, pred: impl Fn(&MockCall) -> bool) -> Vec<MockCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| pred(c))
            .cloned()
            .collect()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        MockRemote::new()
    }
}

impl MockState {
    /// Record `call`, then fail it if a failure is queued.
    fn begin(&mut self, call: MockCall) -> RemoteResult<()> {
        self.calls.push(call);
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fields_of(payload: &Value) -> Map<String, Value> {
        payload.as_object().cloned().unwrap_or_default()
    }
}

/// Remote type name of a kind, e.g. `ProductVariant`.
fn type_name(kind: EntityKind) -> String {
    kind.as_str()
        .split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

impl RemoteClient for MockRemote {
    fn create(
        &self,
        kind: EntityKind,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord> {
        let mut state = self.state.lock();
        state.begin(MockCall::Create {
            kind,
            key: idempotency_key.to_string(),
        })?;
        if let Some(existing) = state.creates_by_key.get(idempotency_key) {
            return Ok(existing.clone());
        }
        let id = format!("gid://shop/{}/{}", type_name(kind), state.next_id);
        state.next_id += 1;
        let record = RemoteRecord {
            id: id.clone(),
            updated_at: None,
            fields: MockState::fields_of(payload),
        };
        state.records.insert((kind, id), record.clone());
        state
            .creates_by_key
            .insert(idempotency_key.to_string(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord> {
        let mut state = self.state.lock();
        state.begin(MockCall::Update {
            kind,
            remote_id: remote_id.to_string(),
            key: idempotency_key.to_string(),
        })?;
        let record = state
            .records
            .get_mut(&(kind, remote_id.to_string()))
            .ok_or_else(|| RemoteError::Conflict(format!("{remote_id} not found")))?;
        record.fields.extend(MockState::fields_of(payload));
        Ok(record.clone())
    }

    fn find_by_code(&self, kind: EntityKind, code: &str) -> RemoteResult<Option<RemoteRecord>> {
        let mut state = self.state.lock();
        state.begin(MockCall::FindByCode {
            kind,
            code: code.to_string(),
        })?;
        Ok(state
            .records
            .iter()
            .find(|((k, _), r)| *k == kind && r.fields.get("code").and_then(Value::as_str) == Some(code))
            .map(|(_, r)| r.clone()))
    }

    fn cancel_contract(&self, remote_id: &str, idempotency_key: &str) -> RemoteResult<RemoteRecord> {
        let mut state = self.state.lock();
        state.begin(MockCall::Cancel {
            remote_id: remote_id.to_string(),
            key: idempotency_key.to_string(),
        })?;
        let record = state
            .records
            .get_mut(&(EntityKind::SubscriptionContract, remote_id.to_string()))
            .ok_or_else(|| RemoteError::Conflict(format!("{remote_id} not found")))?;
        record
            .fields
            .insert("status".to_string(), Value::String("cancelled".into()));
        Ok(record.clone())
    }

    fn create_billing_attempt(
        &self,
        contract_remote_id: &str,
        request: &BillingAttemptRequest,
    ) -> RemoteResult<BillingAttemptResult> {
        let mut state = self.state.lock();
        state.begin(MockCall::Charge {
            remote_id: contract_remote_id.to_string(),
            key: request.idempotency_key.clone(),
        })?;
        if let Some(existing) = state.charges_by_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }
        if !state
            .records
            .contains_key(&(EntityKind::SubscriptionContract, contract_remote_id.to_string()))
        {
            return Err(RemoteError::Conflict(format!(
                "{contract_remote_id} not found"
            )));
        }
        let n = state.next_id;
        state.next_id += 1;
        let (status, error) = state
            .charge_outcome
            .clone()
            .unwrap_or((ChargeStatus::Success, None));
        let result = BillingAttemptResult {
            id: format!("gid://shop/SubscriptionBillingAttempt/{n}"),
            status,
            order_id: (status == ChargeStatus::Success).then(|| format!("gid://shop/Order/{n}")),
            error_message: error,
        };
        // A failed charge may be retried with the same key.
        if status != ChargeStatus::Failure {
            state
                .charges_by_key
                .insert(request.idempotency_key.clone(), result.clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
