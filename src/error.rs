// src/error.rs
//! Run-level error taxonomy.
//!
//! Per-story problems never propagate as `Err`; they are recorded in the
//! [`RunReport`](crate::report::RunReport) with one of the [`ErrorKind`]s.
//! Only [`ConfigError`] aborts a run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed feed entry, dropped before clustering.
    CollectionParseError,
    /// Cluster below the minimum distinct-source count (or without consensus).
    /// Held for a future run; not counted as a failure.
    InsufficientCorroboration,
    /// Every configured provider was exhausted for the story.
    GenerationError,
    /// Story already published for the period, or duplicate content hash.
    PublicationConflict,
    /// Invalid or missing configuration. Fatal.
    ConfigurationError,
}

impl ErrorKind {
    /// Whether this kind counts towards `RunReport::failed`.
    pub fn is_failure(self) -> bool {
        matches!(self, ErrorKind::GenerationError)
    }
}

/// Fatal configuration failure: raised before any generation attempt.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no usable provider credential for AI_MODEL={0}")]
    NoUsableProvider(String),
    #[error("unknown provider `{0}` in AI_MODEL")]
    UnknownProvider(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigurationError
    }

    pub(crate) fn invalid(key: &'static str, value: impl ToString) -> Self {
        ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }
    }
}
