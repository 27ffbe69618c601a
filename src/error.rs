//! Error types surfaced by the core.
//!
//! Per the error-handling design: only configuration problems, physics-table
//! generation failures and external I/O are raised as errors. Numeric traps
//! (e.g. `sin^2(theta) > 1` from interpolation) and boundary degeneracies are
//! clamped or reclassified in place and never produce a `SimError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to build physics table: {0}")]
    TableGeneration(String),

    #[error("event stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
