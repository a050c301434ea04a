use thiserror::Error;

/// Errors raised while creating an isolated execution unit.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(String),

    #[error("Worker did not pass its capability probe: {0}")]
    ProbeFailed(String),
}
