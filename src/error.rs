//! # Error Handling
//!
//! This module defines the centralized error type for the `addon-repos`
//! library. It uses `thiserror` to build a single `Error` enum that covers
//! every failure a registry or repository operation can report.
//!
//! ## Key Components
//!
//! - **`Error`**: The enum of all failure modes. Each variant carries the
//!   repository key, URL or path involved so that callers get actionable
//!   messages without additional wrapping.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Lookups of unknown repositories are not errors: `Registry::get` returns
//! `None` instead.
//!
//! No failure reported here ever leaves a committed data directory partially
//! written. A failed sync returns one of these errors and the previous
//! snapshot stays in place.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for addon-repos operations
#[derive(Error, Debug)]
pub enum Error {
    /// The repository descriptor has no artifact yet, so there is nothing to
    /// fetch. Raised before any filesystem state is touched.
    #[error("Repository {key} does not contain an artifact")]
    ArtifactMissing { key: String },

    /// A link target did not exist or was not a directory.
    #[error("Validation error for {}: {message}", path.display())]
    Validation { path: PathBuf, message: String },

    /// A directory creation, removal, rename or symlink call failed.
    #[error("Filesystem operation error: failed to {operation} {}: {source}", path.display())]
    Filesystem {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact bytes could not be retrieved.
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The artifact could not be decoded or extracted.
    #[error("Unpack error into {}: {message}", path.display())]
    Unpack { path: PathBuf, message: String },

    /// The caller cancelled the operation.
    #[error("Operation cancelled: {context}")]
    Cancelled { context: String },

    /// The operation ran past its deadline.
    #[error("Deadline exceeded: {context}")]
    DeadlineExceeded { context: String },

    /// A registry configuration value could not be parsed.
    #[error("Configuration parsing error: {message}")]
    ConfigParse { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Build a `Filesystem` error for `operation` on `path`.
    pub(crate) fn filesystem(
        operation: &str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Error::Filesystem {
            operation: operation.to_string(),
            path: path.into(),
            source,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
