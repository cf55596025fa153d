//! # Engine Error Types

use ember_jobs::JobError;
use ember_memory::AllocError;
use thiserror::Error;

/// Errors surfaced by the engine facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The configuration text could not be parsed.
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    /// A memory operation failed.
    #[error("memory error: {0}")]
    Memory(#[from] AllocError),

    /// A job system operation failed.
    #[error("job system error: {0}")]
    Jobs(#[from] JobError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
