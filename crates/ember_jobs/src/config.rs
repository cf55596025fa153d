//! # Job System Configuration
//!
//! Worker counts per thread type. Loaded once at startup.

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Number of worker threads per thread type.
///
/// The main thread is not counted: main-thread jobs run on the owner of the
/// [`JobSystem`](crate::JobSystem).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSystemConfig {
    /// Workers serving [`JobThreadType::Render`](crate::JobThreadType::Render).
    pub render_workers: usize,
    /// Workers serving [`JobThreadType::Resource`](crate::JobThreadType::Resource).
    pub resource_workers: usize,
    /// Workers serving [`JobThreadType::Other`](crate::JobThreadType::Other).
    pub other_workers: usize,
}

impl Default for JobSystemConfig {
    /// One worker per hardware thread, minus the main thread: the first goes
    /// to render, the second to resource, the rest to other.
    fn default() -> Self {
        let hardware = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::for_hardware_threads(hardware)
    }
}

impl JobSystemConfig {
    /// Splits `hardware_threads - 1` workers across the thread types, with at
    /// least one worker each.
    #[must_use]
    pub fn for_hardware_threads(hardware_threads: usize) -> Self {
        let workers = hardware_threads.saturating_sub(1);
        Self {
            render_workers: 1,
            resource_workers: 1,
            other_workers: workers.saturating_sub(2).max(1),
        }
    }

    /// One worker per type, for tests and tools.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            render_workers: 1,
            resource_workers: 1,
            other_workers: 1,
        }
    }

    /// Parses a config from TOML; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidConfig`] if the text does not parse or the
    /// result fails [`JobSystemConfig::validate`].
    pub fn from_toml_str(text: &str) -> JobResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| JobError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Total worker threads.
    #[inline]
    #[must_use]
    pub const fn total_workers(&self) -> usize {
        self.render_workers + self.resource_workers + self.other_workers
    }

    /// Checks that every worker-backed thread type has at least one worker.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidConfig`] naming the empty thread type.
    pub fn validate(&self) -> JobResult<()> {
        for (name, count) in [
            ("render_workers", self.render_workers),
            ("resource_workers", self.resource_workers),
            ("other_workers", self.other_workers),
        ] {
            if count == 0 {
                return Err(JobError::InvalidConfig(format!(
                    "{name} must be at least 1 or its jobs never run"
                )));
            }
        }
        Ok(())
    }
}
