// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use sync_engine::EngineError;
use thiserror::Error;

/// Errors reported by `storesync` commands.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(EngineError),

    #[error(transparent)]
    Core(#[from] sync_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("billing run finished with {errors} error(s)\n  hint: see the log for the failing subscriptions")]
    BillingErrors { errors: usize },

    #[error("push sweep finished with {errors} error(s)\n  hint: run 'storesync errors' to see the failing entities")]
    SweepErrors { errors: usize },
}

/// A specialized Result type for storesync commands.
pub type Result<T> = std::result::Result<T, Error>;

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Core(e) => Error::Core(e),
            EngineError::Io(e) => Error::Io(e),
            other => Error::Engine(other),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
