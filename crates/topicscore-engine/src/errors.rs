//! Request-level error model.
//!
//! Only request-fatal conditions reach this type. Per-record scoring failures
//! are absorbed inside the worker pool and never surface here.

use std::io;
use std::path::PathBuf;

use topicscore_types::TopicError;

use crate::pool::ComputeError;
use crate::session::SessionError;
use crate::source::SourceError;

/// Status reported to callers for client-side input errors.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Status reported when the requester abandoned the run.
pub const STATUS_CLIENT_CLOSED: u16 = 499;
/// Status reported for storage and compute failures.
pub const STATUS_INTERNAL: u16 = 500;

/// Categorized failure of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Caller-supplied topic is empty or unsafe. No resources were touched.
    #[error("invalid topic: {0}")]
    Validation(#[from] TopicError),

    /// Compute session could not be acquired.
    #[error("compute session unavailable: {0}")]
    Resource(#[from] SessionError),

    /// Corpus file does not exist.
    #[error("no corpus found at {}", path.display())]
    NotFound { path: PathBuf },

    /// Corpus exists but could not be read.
    #[error("failed to read corpus {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Scoring failed for the whole batch.
    #[error("scoring failed: {0}")]
    FatalCompute(ComputeError),

    /// The caller raised the cancel signal.
    #[error("request cancelled")]
    Cancelled,
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::NotFound { path } => Self::NotFound { path },
            SourceError::Io { path, source } => Self::Io { path, source },
            SourceError::UnsupportedScheme { uri } => Self::Io {
                path: PathBuf::from(&uri),
                source: io::Error::new(io::ErrorKind::Unsupported, "unsupported storage scheme"),
            },
        }
    }
}

impl From<ComputeError> for PipelineError {
    fn from(e: ComputeError) -> Self {
        match e {
            ComputeError::Cancelled => Self::Cancelled,
            other => Self::FatalCompute(other),
        }
    }
}

impl PipelineError {
    /// HTTP-equivalent status for the presentation layer.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => STATUS_BAD_REQUEST,
            Self::Cancelled => STATUS_CLIENT_CLOSED,
            Self::Resource(_) | Self::NotFound { .. } | Self::Io { .. } | Self::FatalCompute(_) => {
                STATUS_INTERNAL
            }
        }
    }

    /// `true` when the caller's input was at fault.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Short machine-readable kind, used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Resource(_) => "resource",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io",
            Self::FatalCompute(_) => "fatal_compute",
            Self::Cancelled => "cancelled",
        }
    }
}
