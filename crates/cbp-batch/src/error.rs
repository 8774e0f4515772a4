//! Error taxonomy for the import pipeline
//!
//! The chunk engine classifies failures by variant, never by message:
//!
//! - [`BatchError::Validation`]: a field broke its format rule. Never retried.
//! - [`BatchError::Read`]: one input line could not be mapped. Skippable up to the skip limit.
//! - [`BatchError::Retryable`]: a transient store failure. The chunk is rolled back and re-written.
//! - [`BatchError::Fatal`]: terminates the step immediately.

use crate::crypto::CryptoError;
use crate::store::StoreError;
use crate::validator::Field;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BatchError>;

/// A record failed one of its field rules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} '{value}' for customer '{record}'")]
pub struct ValidationError {
    pub field: Field,
    pub value: String,
    /// Identifies the offending record (its raw name)
    pub record: String,
}

/// An input line could not be turned into a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unreadable input at line {line}: {message}")]
pub struct ReadError {
    pub line: u64,
    pub message: String,
}

/// Failures that end a step without retry
#[derive(Error, Debug)]
pub enum FatalError {
    #[error(transparent)]
    Encryption(#[from] CryptoError),

    #[error("Cannot open input file '{}': {source}", .path.display())]
    ResourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read input file '{}': {source}", .path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Chunk write failed after {attempts} attempt(s)")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<BatchError>,
    },

    #[error("Step '{step}' has already been started {limit} time(s) without completing")]
    StartLimitExceeded { step: String, limit: u32 },

    #[error("Transaction could not be rolled back: {0}")]
    Transaction(#[source] StoreError),

    #[error("Step misconfigured: {0}")]
    StepConfiguration(String),
}

/// Every failure the pipeline can surface
#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("{message}")]
    Retryable {
        message: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl BatchError {
    pub fn retryable(message: impl Into<String>, source: StoreError) -> Self {
        Self::Retryable {
            message: message.into(),
            source,
        }
    }

    pub fn step_configuration(message: impl Into<String>) -> Self {
        Self::Fatal(FatalError::StepConfiguration(message.into()))
    }

    /// Whether re-running the chunk write may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Whether the failed record may be skipped under a skip limit
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}

impl From<CryptoError> for BatchError {
    fn from(err: CryptoError) -> Self {
        Self::Fatal(FatalError::Encryption(err))
    }
}
