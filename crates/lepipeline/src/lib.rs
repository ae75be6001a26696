#![warn(missing_docs)]

//! lepipeline - Stage Contract and Runner
//!
//! *Le Pipeline* (The Pipeline) - the uniform interface every processing
//! stage implements, the runner that executes one invocation with bounded
//! duration and a declared retry policy, and the shipped stages for every
//! session kind. What a stage computes is opaque to everything above it.

/// Stage trait, execution policy, and shared context.
pub mod contract;
/// Typed stage failure categories.
pub mod failure;
/// Artifact storage collaborator.
pub mod object_store;
/// Timeout/retry execution of one stage invocation.
pub mod runner;
/// Shipped stage implementations per session kind.
pub mod stages;

pub use contract::{Stage, StageContext, StagePolicy};
pub use failure::StageError;
pub use object_store::{LocalObjectStore, ObjectStore, ObjectStoreError};
pub use runner::{StageOutcome, StageRunner};
