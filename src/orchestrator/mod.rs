//! Session orchestration modules.
//!
//! Covers shell spawning and termination, the live session registry, and
//! the provider executor that ties runs to snapshots and artifacts.

pub mod executor;
pub mod registry;
pub mod spawner;

pub use executor::{InteractiveSession, ProviderExecutor};
pub use registry::{
    ExitWatch, OutputStream, ProcessSettings, RunOnceRequest, SessionRegistry, SpawnRequest,
    StartedSession,
};
