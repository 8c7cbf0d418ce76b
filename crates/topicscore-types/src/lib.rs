//! Shared topicscore data model.
//!
//! Pure data types used by the engine and by whatever presentation layer
//! renders results. Kept free of runtime dependencies so callers can depend
//! on it without pulling in tokio.

#![warn(clippy::pedantic)]

pub mod record;
pub mod topic;

pub use record::{Partition, Record, ScoredRecord, Sentiment, NEUTRAL_BAND};
pub use topic::{Topic, TopicError};
