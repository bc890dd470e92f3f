//! Errors raised by the simulation harness.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invariant violated at tick {tick}: {message}")]
    Invariant { tick: u64, message: String },

    #[error("Scenario check failed: {0}")]
    Check(String),
}

impl SimError {
    pub fn invariant(tick: u64, message: impl Into<String>) -> Self {
        SimError::Invariant {
            tick,
            message: message.into(),
        }
    }
}
