use buddypool_core::{InvariantViolation, PoolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("{scenario}: invariant violated after {step} ops: {source}")]
    Invariant {
        scenario: &'static str,
        step: usize,
        #[source]
        source: InvariantViolation,
    },
    #[error("{scenario}: payload of block at offset {offset:#x} was overwritten")]
    PayloadCorrupted {
        scenario: &'static str,
        offset: usize,
    },
    #[error("{scenario}: pool did not return to a single free block after releasing everything")]
    NotPristine { scenario: &'static str },
    #[error("unknown scenario '{0}' (expected one of: {1})")]
    UnknownScenario(String, String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
