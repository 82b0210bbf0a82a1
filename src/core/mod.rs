//! Core engine module
//!
//! Provides the core-count-sized worker pool, the engine context that
//! wires classification, scheduling and monitoring together, and the
//! self-test behind `tierscale diagnose`.

mod context;
pub mod diagnostics;
mod scheduler;

pub use context::*;
pub use diagnostics::{run_diagnostics, CheckStatus, DiagnosticReport};
pub use scheduler::*;
