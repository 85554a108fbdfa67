//! Error types for projectmap.
//!
//! Library crates use [`ProjectMapError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all projectmap operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectMapError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Required folders or template assets are missing at startup.
    #[error("bootstrap error: {message}")]
    Bootstrap { message: String },

    /// Transport-level HTTP failure (connect, TLS, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The platform answered with a status outside the accepted set.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Api {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// A platform response did not have the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (missing fields, inconsistent inventory, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The external diagram compiler failed.
    #[error("render error: {0}")]
    Render(String),

    /// A wiki publication step failed.
    #[error("wiki publish failed at step '{step}': {source}")]
    Publish {
        step: &'static str,
        #[source]
        source: Box<ProjectMapError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProjectMapError>;

impl ProjectMapError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a bootstrap error from any displayable message.
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Tag an error with the publication step it happened in.
    pub fn at_step(step: &'static str, source: ProjectMapError) -> Self {
        Self::Publish {
            step,
            source: Box::new(source),
        }
    }

    /// HTTP status of an API error, looking through publish wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Publish { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Name of the failed publication step, if this error came from one.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            Self::Publish { step, .. } => Some(step),
            _ => None,
        }
    }
}
