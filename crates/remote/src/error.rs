// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote API error taxonomy and decoding.

use serde_json::Value;
use thiserror::Error;

/// Errors returned by the remote platform or the transport to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The platform refused the payload. Retrying the same payload cannot succeed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Timeout, connection failure, 5xx or an unreadable response.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Too many requests. Carries the server's Retry-After in seconds, if sent.
    #[error("rate limited{}", .retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    /// The remote record was deleted or changed identity concurrently.
    #[error("conflict: {0}\n  hint: reconcile the record, then run `storesync push resume`")]
    Conflict(String),

    /// The access token was refused.
    #[error("unauthorized: {0}\n  hint: check [remote] access_token or STORESYNC_ACCESS_TOKEN")]
    Unauthorized(String),
}

impl RemoteError {
    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transient(_) | RemoteError::RateLimited { .. }
        )
    }

    /// Classify an HTTP error response.
    pub fn from_response(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let message = decode_error_body(body).unwrap_or_else(|| format!("HTTP {status}"));
        match status {
            429 => RemoteError::RateLimited { retry_after },
            401 | 403 => RemoteError::Unauthorized(message),
            404 | 409 | 410 => RemoteError::Conflict(message),
            400 | 422 => RemoteError::Validation(message),
            408 | 500..=599 => RemoteError::Transient(message),
            _ => RemoteError::Validation(message),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Transient(format!("invalid response: {e}"))
        } else {
            RemoteError::Transient(e.to_string())
        }
    }
}

/// Extract a readable message from an error body.
///
/// Understands `{"errors": "..."}`, `{"errors": {"field": ["msg"]}}`,
/// `{"errors": [{"message": "..."}]}` and `{"error": "..."}`.
pub fn decode_error_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let errors = value.get("errors").or_else(|| value.get("error"))?;
    let message = match errors {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(fields) => fields
            .iter()
            .map(|(field, msgs)| {
                let text = match msgs {
                    Value::Array(list) => list
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{field} {text}")
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => return None,
    };
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

/// A specialized Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
