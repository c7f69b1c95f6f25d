// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote client abstraction.
//!
//! The engine talks to the platform only through [`RemoteClient`], so tests
//! substitute a scripted implementation for [`crate::HttpRemote`].

use serde_json::Value;
use sync_core::EntityKind;

use crate::error::RemoteResult;
use crate::payload::{BillingAttemptRequest, BillingAttemptResult, RemoteRecord};

/// Typed operations against the remote platform.
///
/// Every mutation carries an idempotency key. Replaying a call with the same
/// key must return the original result instead of acting twice.
pub trait RemoteClient: Send + Sync {
    /// Create a record.
    fn create(
        &self,
        kind: EntityKind,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord>;

    /// Update an existing record.
    fn update(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord>;

    /// Look a record up by merchant code (email, SKU, handle).
    fn find_by_code(&self, kind: EntityKind, code: &str) -> RemoteResult<Option<RemoteRecord>>;

    /// Cancel a subscription contract.
    fn cancel_contract(&self, remote_id: &str, idempotency_key: &str) -> RemoteResult<RemoteRecord>;

    /// Charge one billing cycle of a contract.
    fn create_billing_attempt(
        &self,
        contract_remote_id: &str,
        request: &BillingAttemptRequest,
    ) -> RemoteResult<BillingAttemptResult>;
}

impl<C: RemoteClient + ?Sized> RemoteClient for std::sync::Arc<C> {
    fn create(
        &self,
        kind: EntityKind,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord> {
        (**self).create(kind, payload, idempotency_key)
    }

    fn update(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord> {
        (**self).update(kind, remote_id, payload, idempotency_key)
    }

    fn find_by_code(&self, kind: EntityKind, code: &str) -> RemoteResult<Option<RemoteRecord>> {
        (**self).find_by_code(kind, code)
    }

    fn cancel_contract(&self, remote_id: &str, idempotency_key: &str) -> RemoteResult<RemoteRecord> {
        (**self).cancel_contract(remote_id, idempotency_key)
    }

    fn create_billing_attempt(
        &self,
        contract_remote_id: &str,
        request: &BillingAttemptRequest,
    ) -> RemoteResult<BillingAttemptResult> {
        (**self).create_billing_attempt(contract_remote_id, request)
    }
}
