//! Error types for ocaudit
//!
//! Only fatal, stage-boundary failures are errors in the Rust sense. Failures
//! tied to a single bundle (fetch, parse, validation, conformance) are recorded
//! on the bundle as [`ocaudit_common::models::BundleError`] and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal audit error
#[derive(Debug, Error)]
pub enum AuditError {
    /// Catalog location unreadable or in no recognised format
    #[error("Catalog error at {location}: {message}")]
    Catalog { location: PathBuf, message: String },

    /// Relational catalog query failed
    #[error("Catalog query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Declarative catalog document could not be parsed
    #[error("Malformed catalog document {path}: {message}")]
    MalformedDocument { path: PathBuf, message: String },

    /// Conformance tests enabled but their execution environment is missing
    #[error("Conformance test environment unavailable: {0}")]
    ExecutionEnvironment(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Report could not be serialized or written
    #[error("Report error: {0}")]
    Report(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ocaudit-common error
    #[error(transparent)]
    Common(#[from] ocaudit_common::Error),
}

impl AuditError {
    pub fn catalog(location: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AuditError::Catalog {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AuditError::MalformedDocument {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for fatal audit operations
pub type AuditResult<T> = Result<T, AuditError>;
