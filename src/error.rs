/// Error types for interval loading and caching
///
/// Every fallible library operation returns `LoadError`. The binary and the
/// integration tests wrap it in `anyhow`.
use thiserror::Error;

use crate::range::GenomicRange;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// I/O or index failure while reaching the alignment source
    #[error("alignment source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// Load aborted by the user or by a reset
    #[error("load cancelled")]
    Cancelled,

    /// Whole-genome or otherwise aggregate pseudo-range
    #[error("cannot load alignments for aggregate range '{chromosome}'")]
    UnsupportedRange { chromosome: String },

    /// An alignment lies outside the interval it was loaded for
    #[error("alignment {name} at {start}-{end} lies outside loaded range {range}")]
    PackingInconsistency {
        name: String,
        start: u64,
        end: u64,
        range: GenomicRange,
    },

    /// Region string or coordinates that do not describe a valid range
    #[error("invalid range: {message}")]
    InvalidRange { message: String },

    /// The executor refused or failed to start a load
    #[error("could not schedule load: {message}")]
    ScheduleFailed { message: String },

    /// Malformed chromosome alias table
    #[error("alias file error at line {line}: {message}")]
    AliasFile { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, LoadError>;

impl LoadError {
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::source_unavailable(err.to_string())
    }
}

impl From<rust_htslib::errors::Error> for LoadError {
    fn from(err: rust_htslib::errors::Error) -> Self {
        Self::source_unavailable(err.to_string())
    }
}
