// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded exponential backoff for remote calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sync_remote::{RemoteError, RemoteResult};
use tracing::warn;

/// Retry schedule for retryable remote failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total calls, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add up to 25% jitter to each delay.
    pub add_jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A single call, never retried.
    pub fn no_retry() -> Self {
        RetryPolicy::new(1)
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Delay before the given retry (1 = first retry). Zero for attempt 0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let secs = base.min(self.max_delay.as_secs_f64());
        if self.add_jitter {
            Duration::from_secs_f64(secs + secs * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts, or `cancel` is raised.
    ///
    /// Returns the last result and the number of calls made.
    pub fn run<T, F>(&self, cancel: &AtomicBool, mut op: F) -> (RemoteResult<T>, u32)
    where
        F: FnMut() -> RemoteResult<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = op();
            let err = match result {
                Ok(_) => return (result, attempt),
                Err(ref e) if !e.is_retryable() => return (result, attempt),
                Err(ref e) => e.clone(),
            };
            if attempt >= self.max_attempts || cancel.load(Ordering::Relaxed) {
                return (result, attempt);
            }
            let mut delay = self.delay_for_attempt(attempt);
            if let RemoteError::RateLimited {
                retry_after: Some(secs),
            } = err
            {
                delay = delay.max(Duration::from_secs(secs).min(self.max_delay));
            }
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying remote call");
            std::thread::sleep(delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(4)
    }
}

/// Cheap pseudo-random fraction in [0, 1) from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
