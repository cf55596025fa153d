//! # Ember Jobs
//!
//! Dependency-aware job scheduler.
//!
//! Work is expressed as a graph of [`Job`]s: a job is queued only once every
//! job it depends on has finished, and runs on a worker of the
//! [`JobThreadType`] it was scheduled for. Typical use is asset streaming:
//! resource workers read files, other workers decode them, the render thread
//! uploads the results.
//!
//! ## Guarantees
//!
//! 1. **Ordering** - a job's callable starts strictly after every dependency's
//!    done flag is set
//! 2. **Exactly once** - a submitted job runs once; resubmission needs `reset`
//! 3. **Isolation** - a failing or panicking job is reported, never fatal
//! 4. **Full drain** - `destroy` returns only after every submitted job ran,
//!    or reports the ones that never could
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_jobs::{Job, JobSystem, JobSystemConfig, JobThreadType};
//!
//! let jobs = JobSystem::init(JobSystemConfig::default())?;
//! let read = Job::new("read", || { /* ... */ });
//! let decode = Job::new("decode", || { /* ... */ });
//! decode.add_dependency(&read)?;
//! jobs.schedule(&decode, JobThreadType::Other)?;
//! jobs.schedule(&read, JobThreadType::Resource)?;
//! jobs.destroy()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod job;
mod queue;
pub mod system;

pub use config::JobSystemConfig;
pub use error::{JobError, JobResult};
pub use job::{Job, JobId, JobState, JobStatus, JobThreadType};
pub use system::{JobFailure, JobSystem, FAILURE_BACKLOG};
