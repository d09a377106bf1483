//! Error types for plunk.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for plunk operations.
pub type Result<T> = std::result::Result<T, PlunkError>;

/// Main error type for plunk.
#[derive(Error, Debug)]
pub enum PlunkError {
    /// A package directory, store entry, or link was not found.
    #[error("{0}")]
    NotFound(String),

    /// A manifest is missing required fields or fails to parse.
    #[error("invalid manifest at {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    /// `publish` refused a private package without `--private`.
    #[error("package {name} is private; pass --private to publish it anyway")]
    PublishRefused { name: String },

    /// A prepack/postpack/build script exited non-zero.
    #[error("script '{script}' failed with exit code {code}")]
    ScriptFailed { script: String, code: i32 },

    /// The cross-process lock could not be acquired within its retry budget.
    #[error("could not acquire lock at {path}: {hint}")]
    LockBusy { path: PathBuf, hint: String },

    /// Underlying filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// On-disk metadata/state/registry failed validation.
    ///
    /// Call sites treat this the same as `NotFound` (degrade gracefully) but
    /// it is logged distinctly so corruption is visible in `--verbose` runs.
    #[error("corrupt data at {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// General error with a message, for command-layer glue.
    #[error("{0}")]
    Other(String),
}

impl PlunkError {
    /// Build a `NotFound` error that names what was missing.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        PlunkError::NotFound(what.to_string())
    }
}

impl From<anyhow::Error> for PlunkError {
    fn from(err: anyhow::Error) -> Self {
        PlunkError::Other(err.to_string())
    }
}

impl From<&str> for PlunkError {
    fn from(s: &str) -> Self {
        PlunkError::Other(s.to_string())
    }
}

impl From<String> for PlunkError {
    fn from(s: String) -> Self {
        PlunkError::Other(s)
    }
}
