//! # Engine Configuration
//!
//! One TOML document with a `[memory]` and a `[jobs]` table:
//!
//! ```toml
//! [memory]
//! frame_arena_bytes = 1048576
//! general_heap_bytes = 16777216
//!
//! [jobs]
//! render_workers = 1
//! resource_workers = 2
//! other_workers = 4
//! ```
//!
//! Missing tables and keys fall back to their defaults.

use std::path::Path;

use ember_jobs::JobSystemConfig;
use ember_memory::MemoryConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Startup configuration for the engine core.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Arena budgets.
    pub memory: MemoryConfig,
    /// Worker thread counts.
    pub jobs: JobSystemConfig,
}

impl EngineConfig {
    /// Parses and validates a config.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the text does not parse, or
    /// the memory/job error for the first section that fails validation.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the file cannot be read, and
    /// otherwise fails like [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Validates both sections.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self) -> EngineResult<()> {
        self.memory.validate()?;
        self.jobs.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_jobs::JobError;
    use ember_memory::AllocError;

    #[test]
    fn test_full_document() {
        let config = EngineConfig::from_toml_str(
            r"
            [memory]
            frame_arena_bytes = 4096
            pool_slots = 32

            [jobs]
            render_workers = 1
            resource_workers = 2
            other_workers = 4
            ",
        )
        .unwrap();
        assert_eq!(config.memory.frame_arena_bytes, 4096);
        assert_eq!(config.memory.pool_slots, 32);
        assert_eq!(
            config.memory.general_heap_bytes,
            MemoryConfig::default().general_heap_bytes
        );
        assert_eq!(config.jobs.total_workers(), 7);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_errors_keep_their_source() {
        assert!(matches!(
            EngineConfig::from_toml_str("[jobs]\nother_workers = 0"),
            Err(EngineError::Jobs(JobError::InvalidConfig(_)))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[memory]\ngeneral_heap_bytes = 1"),
            Err(EngineError::Memory(AllocError::ArenaTooSmall { .. }))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[audio]"),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::load("/nonexistent/ember.toml"),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
