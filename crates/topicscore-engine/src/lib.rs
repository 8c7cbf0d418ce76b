//! Core orchestration crate for topicscore pipeline execution.
//!
//! A run resolves a topic to a corpus file, acquires a compute session,
//! streams the corpus through a worker pool that scores each line, and
//! returns the materialized result set. See [`Pipeline::run`].

#![warn(clippy::pedantic)]

pub mod cancel;
pub mod config;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod pool;
pub mod result;
pub mod scoring;
pub mod session;
pub mod source;

// Re-export public API for convenience
pub use cancel::CancelSignal;
pub use config::types::EngineConfig;
pub use errors::PipelineError;
pub use orchestrator::{Pipeline, RunStage};
pub use result::{ResultSet, RunSummary, SentimentBreakdown};
pub use scoring::{LexiconScorer, ScoreError, ScoringFunction};
pub use session::{ClusterSession, LocalCluster, Session, SessionError};
pub use source::{FsSourceReader, SourceError, SourceReader};
