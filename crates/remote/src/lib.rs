// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sync-remote: Client for the remote commerce platform
//!
//! This crate provides the [`RemoteClient`] trait used by the sync engine,
//! its HTTP implementation, the wire payload types and the error taxonomy
//! (validation, transient, rate limited, conflict, unauthorized).

pub mod client;
pub mod error;
pub mod http;
pub mod payload;

pub use client::RemoteClient;
pub use error::{decode_error_body, RemoteError, RemoteResult};
pub use http::{HttpRemote, HttpRemoteConfig, IDEMPOTENCY_HEADER};
pub use payload::{BillingAttemptRequest, BillingAttemptResult, ChargeStatus, RemoteRecord};
