//! Change-control policy.
//!
//! Loads the per-task path whitelist from `ai/tasks/<key>/whitelist.txt`
//! and reconciles working-tree snapshots against it, reverting changes
//! that fall outside the allowed prefixes.

pub mod enforcer;
pub mod whitelist;

pub use enforcer::{reconcile, ReconcileReport};
pub use whitelist::Whitelist;
