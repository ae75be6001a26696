#![warn(missing_docs)]

//! lepilote - Session Orchestrator
//!
//! *Le Pilote* (The Pilot) - owns session identity and status transitions,
//! resolves the stage pipeline for each request kind, and drives every
//! admitted session through it on its own task: quota gates, bounded stage
//! execution, step history, live events, terminal finalization.

/// Submission error types.
pub mod error;
/// The orchestration loop.
pub mod orchestrator;
/// Static kind-to-pipeline resolution.
pub mod pipelines;

pub use error::SubmitError;
pub use orchestrator::Orchestrator;
pub use pipelines::PipelineSet;
