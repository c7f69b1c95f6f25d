// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-over-HTTPS implementation of [`RemoteClient`].
//!
//! Resources live under `<base_url>/<resource>`, e.g. `/customers` and
//! `/customers/<remote id>`. Mutations send the `Idempotency-Key` header.
//! A 429 is retried in place, honouring `Retry-After` up to a cap; every
//! other failure is returned classified.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sync_core::EntityKind;
use tracing::{debug, warn};

use crate::client::RemoteClient;
use crate::error::{RemoteError, RemoteResult};
use crate::payload::{BillingAttemptRequest, BillingAttemptResult, RemoteRecord};

/// Header carrying the idempotency key of a mutation.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Wait used when a 429 carries no Retry-After.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Connection settings for [`HttpRemote`].
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    pub base_url: String,
    pub access_token: String,
    /// Per-request timeout. A timeout is a transient failure.
    pub timeout: Duration,
    /// 429 responses retried in place before giving up.
    pub max_rate_limit_retries: u32,
    /// Upper bound on a single Retry-After wait.
    pub max_retry_after: Duration,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        HttpRemoteConfig {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            access_token: String::new(),
            timeout: Duration::from_secs(30),
            max_rate_limit_retries: 3,
            max_retry_after: Duration::from_secs(30),
        }
    }
}

/// Remote client over HTTP.
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    config: HttpRemoteConfig,
}

impl HttpRemote {
    /// Build a client. Fails on an unparsable base URL.
    pub fn new(config: HttpRemoteConfig) -> RemoteResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::Validation(format!("invalid base url '{}': {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Validation(format!(
                "invalid base url '{}'",
                config.base_url
            )));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(HttpRemote {
            client,
            base_url,
            config,
        })
    }

    /// Join path segments onto the base URL, escaping each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request, retrying rate-limited responses in place.
    fn send<T, F>(&self, build: F) -> RemoteResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        loop {
            let response = build().bearer_auth(&self.config.access_token).send()?;
            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<T>()?);
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            let body = response.text().unwrap_or_default();
            let err = RemoteError::from_response(status.as_u16(), &body, retry_after);

            if matches!(err, RemoteError::RateLimited { .. })
                && retries < self.config.max_rate_limit_retries
            {
                retries += 1;
                let wait = retry_after
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RETRY_AFTER)
                    .min(self.config.max_retry_after);
                warn!(retries, wait_ms = wait.as_millis() as u64, "rate limited, waiting");
                std::thread::sleep(wait);
                continue;
            }

            debug!(status = status.as_u16(), error = %err, "remote call failed");
            return Err(err);
        }
    }
}

impl RemoteClient for HttpRemote {
    fn create(
        &self,
        kind: EntityKind,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord> {
        let url = self.url(&[kind.resource()]);
        self.send(|| {
            self.client
                .post(url.clone())
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(payload)
        })
    }

    fn update(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
        idempotency_key: &str,
    ) -> RemoteResult<RemoteRecord> {
        let url = self.url(&[kind.resource(), remote_id]);
        self.send(|| {
            self.client
                .put(url.clone())
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(payload)
        })
    }

    fn find_by_code(&self, kind: EntityKind, code: &str) -> RemoteResult<Option<RemoteRecord>> {
        let url = self.url(&[kind.resource()]);
        let records: Vec<RemoteRecord> =
            self.send(|| self.client.get(url.clone()).query(&[("code", code)]))?;
        Ok(records.into_iter().next())
    }

    fn cancel_contract(&self, remote_id: &str, idempotency_key: &str) -> RemoteResult<RemoteRecord> {
        let url = self.url(&[
            EntityKind::SubscriptionContract.resource(),
            remote_id,
            "cancel",
        ]);
        self.send(|| {
            self.client
                .post(url.clone())
                .header(IDEMPOTENCY_HEADER, idempotency_key)
        })
    }

    fn create_billing_attempt(
        &self,
        contract_remote_id: &str,
        request: &BillingAttemptRequest,
    ) -> RemoteResult<BillingAttemptResult> {
        let url = self.url(&[
            EntityKind::SubscriptionContract.resource(),
            contract_remote_id,
            "billing_attempts",
        ]);
        self.send(|| {
            self.client
                .post(url.clone())
                .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
                .json(request)
        })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
