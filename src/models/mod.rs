//! Domain model module declarations.

pub mod output;
pub mod run;
pub mod session;
