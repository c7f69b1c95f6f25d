// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

fn fast(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts)
        .with_initial_delay(Duration::ZERO)
        .without_jitter()
}

#[parameterized(
    first = { 0, 0 },
    one = { 1, 100 },
    two = { 2, 200 },
    three = { 3, 400 },
    capped = { 10, 1000 },
)]
fn delay_doubles_up_to_cap(attempt: u32, expected_ms: u64) {
    let policy = RetryPolicy::new(5)
        .with_initial_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(1))
        .without_jitter();
    assert_eq!(
        policy.delay_for_attempt(attempt),
        Duration::from_millis(expected_ms)
    );
}

#[test]
fn jitter_stays_within_a_quarter() {
    let policy = RetryPolicy::new(5).with_initial_delay(Duration::from_millis(100));
    let delay = policy.delay_for_attempt(1);
    assert!(delay >= Duration::from_millis(100));
    assert!(delay < Duration::from_millis(126));
}

#[test]
fn zero_attempts_still_calls_once() {
    assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
}

#[test]
fn retries_transient_until_success() {
    let cancel = AtomicBool::new(false);
    let mut calls = 0;
    let (result, attempts) = fast(5).run(&cancel, || {
        calls += 1;
        if calls < 3 {
            Err(RemoteError::Transient("503".into()))
        } else {
            Ok(calls)
        }
    });
    assert_eq!(result.unwrap(), 3);
    assert_eq!(attempts, 3);
}

#[test]
fn validation_is_not_retried() {
    let cancel = AtomicBool::new(false);
    let (result, attempts) = fast(5).run::<(), _>(&cancel, || {
        Err(RemoteError::Validation("title can't be blank".into()))
    });
    assert!(matches!(result, Err(RemoteError::Validation(_))));
    assert_eq!(attempts, 1);
}

#[test]
fn gives_up_after_max_attempts() {
    let cancel = AtomicBool::new(false);
    let (result, attempts) =
        fast(3).run::<(), _>(&cancel, || Err(RemoteError::Transient("timeout".into())));
    assert!(result.is_err());
    assert_eq!(attempts, 3);
}

#[test]
fn cancel_stops_retrying() {
    let cancel = AtomicBool::new(true);
    let (result, attempts) =
        fast(5).run::<(), _>(&cancel, || Err(RemoteError::Transient("timeout".into())));
    assert!(result.is_err());
    assert_eq!(attempts, 1);
}
