//! Error types for the artifact cache

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for artifact cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(buildcache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// The two-level cache could not create its marker file
    #[error("Could not create file in {}", dir.display())]
    #[diagnostic(
        code(buildcache::scratch_file),
        help("The scratch directory must be writable for two-level caching to work")
    )]
    ScratchFile {
        /// Directory the marker file was to be created in
        dir: PathBuf,
        /// The filesystem failure
        #[source]
        source: Box<Error>,
    },

    /// A string that is not a valid rule key
    #[error("Invalid rule key '{value}': {reason}")]
    #[diagnostic(code(buildcache::invalid_rule_key))]
    InvalidRuleKey {
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// An artifact description that cannot be stored
    #[error("Invalid artifact info: {message}")]
    #[diagnostic(code(buildcache::invalid_artifact_info))]
    InvalidArtifactInfo {
        /// Error message describing the problem
        message: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(buildcache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(buildcache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// A backend rejected a store
    #[error("{backend} cache store failed: {message}")]
    #[diagnostic(
        code(buildcache::backend),
        help("Cache failures never fail the build on their own; the artifact is simply not cached")
    )]
    Backend {
        /// Name of the backend that failed
        backend: String,
        /// Error message reported by the backend
        message: String,
    },

    /// A blocking helper task did not complete
    #[error("Background {operation} did not complete: {message}")]
    #[diagnostic(code(buildcache::task_join))]
    TaskJoin {
        /// Operation that was running
        operation: String,
        /// Panic or cancellation message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create an invalid rule key error
    #[must_use]
    pub fn invalid_rule_key(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRuleKey {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid artifact info error
    #[must_use]
    pub fn invalid_artifact_info(msg: impl Into<String>) -> Self {
        Self::InvalidArtifactInfo {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a backend store error
    #[must_use]
    pub fn backend(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    /// Create a scratch file error
    #[must_use]
    pub fn scratch_file(dir: impl Into<PathBuf>, source: Self) -> Self {
        Self::ScratchFile {
            dir: dir.into(),
            source: Box::new(source),
        }
    }

    /// Create a task join error from a tokio join failure
    #[must_use]
    pub fn task_join(operation: impl Into<String>, err: &tokio::task::JoinError) -> Self {
        Self::TaskJoin {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for artifact cache operations
pub type Result<T> = std::result::Result<T, Error>;
