//! Error types for textmark.
//!
//! Library crates use [`TextmarkError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all textmark operations.
#[derive(Debug, thiserror::Error)]
pub enum TextmarkError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Data validation error (sentinel token contract, invalid input).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failure spawning or talking to the converter subprocess
    /// (missing binary, broken pipe, non-UTF-8 output).
    #[error("converter error: {0}")]
    Converter(String),

    /// The converter subprocess exited with a failure status.
    /// Carries the captured stderr verbatim for operator diagnosis.
    #[error("converter process failed: {diagnostics}")]
    ConverterProcess { diagnostics: String },

    /// The converter subprocess exceeded the configured wall-clock timeout.
    #[error("converter timed out after {seconds}s")]
    ConverterTimeout { seconds: u64 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TextmarkError>;

impl TextmarkError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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
}
