//! # Job System Error Types

use thiserror::Error;

/// Errors that can occur while building job graphs or scheduling jobs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The system is shutting down and accepts no more jobs.
    #[error("job system is shut down")]
    SystemShutDown,

    /// The job was already submitted and has not been reset.
    #[error("job '{0}' was already submitted")]
    AlreadySubmitted(String),

    /// A job cannot depend on itself.
    #[error("job '{0}' cannot depend on itself")]
    SelfDependency(String),

    /// The dependency is already registered.
    #[error("job '{job}' already depends on '{dependency}'")]
    DuplicateDependency {
        /// Dependent job.
        job: String,
        /// Repeated dependency.
        dependency: String,
    },

    /// Adding the dependency would close a cycle.
    #[error("dependency '{job}' -> '{dependency}' would create a cycle")]
    CycleDetected {
        /// Dependent job.
        job: String,
        /// Dependency that already (transitively) waits on `job`.
        dependency: String,
    },

    /// The job is submitted but has not finished yet.
    #[error("job '{0}' has not finished")]
    JobNotFinished(String),

    /// The configuration is unusable.
    #[error("invalid job system config: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    /// Teardown found submitted jobs that can never become ready.
    #[error("{pending} submitted jobs never became ready (unsubmitted dependency?)")]
    Stalled {
        /// Jobs left waiting.
        pending: usize,
    },
}

/// Result type for job system operations.
pub type JobResult<T> = Result<T, JobError>;
