// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: webhook ingress and a health probe.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sync_core::WebhookState;
use sync_engine::{Engine, IngressOutcome, SIGNATURE_HEADER};
use tracing::{debug, error};

#[derive(Clone)]
pub struct AppState {
    engine: Engine,
    started: Instant,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        AppState {
            engine,
            started: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks", post(receive_webhook))
        .route("/health", get(health))
        .with_state(state)
}

fn outcome_label(outcome: &IngressOutcome) -> &'static str {
    match outcome {
        IngressOutcome::Applied { .. } => "applied",
        IngressOutcome::Duplicate => "duplicate",
        IngressOutcome::Deferred { .. } => "deferred",
        IngressOutcome::Orphaned => "orphaned",
        IngressOutcome::Ignored { .. } => "ignored",
        IngressOutcome::Rejected => "rejected",
        IngressOutcome::Malformed { .. } => "malformed",
    }
}

fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ingress = state.engine.webhooks.clone();
    let handled =
        tokio::task::spawn_blocking(move || ingress.handle(&body, signature.as_deref())).await;

    let outcome = match handled {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(error = %e, "webhook processing failed");
            return internal_error();
        }
        Err(e) => {
            error!(error = %e, "webhook task aborted");
            return internal_error();
        }
    };
    debug!(outcome = outcome_label(&outcome), "webhook handled");

    let status = StatusCode::from_u16(outcome.http_status()).unwrap_or(StatusCode::OK);
    let mut body = json!({ "outcome": outcome_label(&outcome) });
    match &outcome {
        IngressOutcome::Deferred { deferrals } => body["deferrals"] = json!(deferrals),
        IngressOutcome::Ignored { reason } => body["reason"] = json!(reason),
        IngressOutcome::Malformed { error } => body["error"] = json!(error),
        _ => {}
    }
    (status, Json(body))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let engine = state.engine.clone();
    let counts = tokio::task::spawn_blocking(move || {
        let db = engine.context.store.lock();
        let queue = db.queue_stats(engine.context.now())?;
        let events = db.webhook_event_counts()?;
        Ok::<_, sync_core::Error>((queue, events))
    })
    .await;

    let (queue, events) = match counts {
        Ok(Ok(counts)) => counts,
        Ok(Err(e)) => {
            error!(error = %e, "health check could not read the store");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "error": e.to_string() })),
            );
        }
        Err(e) => {
            error!(error = %e, "health task aborted");
            return internal_error();
        }
    };

    let count = |wanted: WebhookState| {
        events
            .iter()
            .find(|(state, _)| *state == wanted)
            .map_or(0, |(_, n)| *n)
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "storesyncd",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": state.started.elapsed().as_secs(),
            "queue": queue,
            "webhooks": {
                "deferred": count(WebhookState::Deferred),
                "orphaned": count(WebhookState::Orphaned),
            },
        })),
    )
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
