//! mergeorder core library.
//!
//! This crate estimates how hard it is to merge a set of branches into a
//! base branch and searches for the merge order that minimizes that cost:
//! configuration, conflict signal extraction, structural and advisory
//! scoring, the version-control gateway, and the order search strategies.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod scoring;
pub mod search;
pub mod vcs;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::ConflictSignal;
pub use errors::CoreError;
pub use scoring::{ConflictScorer, ScoreResult};
pub use search::{run_search, MergeReport};
pub use vcs::{GitCli, MemoryRepo, VcsGateway};
