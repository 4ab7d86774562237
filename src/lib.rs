#![forbid(unsafe_code)]

//! Provider execution and change-control sandbox.
//!
//! Runs AI coding CLIs against a working tree, streams their sanitized
//! output, and reverts any change outside the task's path whitelist.

pub mod artifacts;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod policy;
pub mod providers;
pub mod snapshot;

pub use config::SandboxConfig;
pub use errors::{AppError, Result};
