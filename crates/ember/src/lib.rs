//! # Ember
//!
//! Engine core: arena allocators, allocator-aware containers and the
//! dependency-aware job scheduler, configured from one TOML document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           EMBER                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────┐          ┌────────────────────┐      │
//! │  │   ember_memory     │          │   ember_jobs       │      │
//! │  │  • Linear / Stack  │  memory  │  • Job graph       │      │
//! │  │  • Pool / FreeList │<─────────│  • Typed workers   │      │
//! │  │  • Containers      │  for job │  • Full drain      │      │
//! │  └────────────────────┘  results └────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember::{EngineArenas, EngineConfig, JobSystem};
//!
//! let config = EngineConfig::load("config/engine.toml")?;
//! let mut arenas = EngineArenas::new(&config.memory);
//! let allocators = arenas.allocators()?;
//! let jobs = JobSystem::init(config.jobs.clone())?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arenas;
pub mod config;
pub mod error;

// Re-export the subsystems
pub use ember_jobs as jobs;
pub use ember_memory as memory;

// Re-export commonly used types
pub use arenas::{EngineAllocators, EngineArenas};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use ember_jobs::{Job, JobStatus, JobSystem, JobSystemConfig, JobThreadType};
pub use ember_memory::{
    Allocator, ArenaBuffer, DynArray, DynString, DynamicQueue, FreeListAllocator,
    LinearAllocator, MemoryConfig, PoolAllocator, ProxyAllocator, SmallQueue, StackAllocator,
};
