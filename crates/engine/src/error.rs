// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for engine operations.

use chrono::{DateTime, Utc};
use sync_core::{EntityKey, FailureKind, SubscriptionStatus};
use sync_remote::RemoteError;
use thiserror::Error;

/// Why a lifecycle request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("skip needs {required_days} days notice before the billing date {billing_at}")]
    NoticeTooShort {
        required_days: u32,
        billing_at: DateTime<Utc>,
    },

    #[error("{max} skips already used in {year}")]
    PeriodQuotaReached { max: u32, year: i32 },

    #[error("{max} consecutive skips already used since the last successful billing")]
    ConsecutiveLimitReached { max: u32 },

    #[error("subscription is {status}, only active subscriptions can skip")]
    NotActive { status: SubscriptionStatus },

    #[error("the cycle billed at {billing_at} is already being charged")]
    CycleInFlight { billing_at: DateTime<Utc> },
}

/// All possible errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] sync_core::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("dependencies not pushed: {}\n  hint: push the referenced records first", format_keys(.missing))]
    Dependency { missing: Vec<EntityKey> },

    #[error("{key} may already exist on the remote: {reason}\n  hint: retry once pushes to the remote succeed")]
    UnconfirmedCreate { key: EntityKey, reason: String },

    #[error("webhook signature verification failed")]
    Authenticity,

    #[error("request refused: {0}")]
    Policy(#[from] PolicyViolation),

    #[error("billing run already in progress\n  hint: another storesync or storesyncd process holds the billing lock")]
    BillingBusy,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Ledger classification of this error when it ends a push.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            EngineError::Remote(RemoteError::Validation(_)) => Some(FailureKind::Validation),
            EngineError::Remote(RemoteError::Conflict(_)) => Some(FailureKind::Conflict),
            EngineError::Remote(_) => Some(FailureKind::Transient),
            EngineError::Dependency { .. } => Some(FailureKind::Dependency),
            _ => None,
        }
    }
}

fn format_keys(keys: &[EntityKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
