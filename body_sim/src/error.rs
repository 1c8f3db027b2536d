//! Errors raised by the simulator harness.

use body_core::BodyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Body model error: {0}")]
    Body(#[from] BodyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A run-time invariant did not hold at the given tick
    #[error("Invariant violated at t={time:.3}s: {reason}")]
    Invariant { time: f64, reason: String },
}

pub type SimResult<T> = Result<T, SimError>;
