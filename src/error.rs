//! Error types for each pipeline stage.
//!
//! Planning errors are fatal to a run. Retrieval, transform and load errors are
//! scoped to a single chunk and are turned into a failed outcome by the pipeline.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("Date range is empty: {start} is after {end}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },

    #[error("No variables requested")]
    NoVariables,

    #[error("Invalid spatial extent: {reason}")]
    InvalidExtent { reason: String },

    #[error("Latest period {period} is outside the range {start}..{end}")]
    LatestOutsideRange {
        period: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Fallback depth must be at least 1")]
    ZeroFallbackDepth,

    #[error("Fallback search needs a latest-day or latest-month granularity, not {granularity}")]
    FallbackNotSupported { granularity: String },

    #[error("Dataset {dataset} does not accept {reason}")]
    UnsupportedSelector { dataset: String, reason: String },

    #[error("Invalid table name `{name}`")]
    InvalidTableName { name: String },

    #[error("Date arithmetic overflowed near {near}")]
    DateOverflow { near: NaiveDate },
}

/// How a retrieval failed. The pipeline handles every kind the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalFailure {
    /// The provider refused the request (bad parameter, quota, credentials).
    Rejected,
    /// The provider has nothing published for the window.
    NoData,
    /// Timeout, connection reset or an unreadable response.
    Transport,
    /// The artifact arrived but is too small to hold a dataset.
    TooSmall,
    /// Local filesystem problem while storing the artifact.
    Io,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Retrieval of {chunk} failed ({kind:?}): {cause}")]
pub struct RetrievalError {
    pub chunk: String,
    pub kind: RetrievalFailure,
    pub cause: String,
}

impl RetrievalError {
    pub fn new(chunk: &str, kind: RetrievalFailure, cause: impl Into<String>) -> Self {
        RetrievalError {
            chunk: chunk.to_string(),
            kind,
            cause: cause.into(),
        }
    }
}

/// Failure reported by a [`crate::download::Provider`] before it is tied to a chunk.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: RetrievalFailure,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: RetrievalFailure, message: impl Into<String>) -> Self {
        ProviderError {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RetrievalFailure::Transport, message)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::transport(e.to_string())
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::new(RetrievalFailure::Io, e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Artifact {path} is empty or corrupt: {reason}")]
    EmptyOrCorrupt { path: PathBuf, reason: String },

    #[error("Schema mismatch in {path}: {reason}")]
    SchemaMismatch { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No records to load into `{table}`")]
    Empty { table: String },

    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),
}
