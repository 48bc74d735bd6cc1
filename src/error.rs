// src/error.rs

use thiserror::Error;

/// Core error types for apkget
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem failure with the path involved
    #[error("I/O error: {0}")]
    IoError(String),

    /// Network failure, non-2xx status or timeout
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Index document could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Identity absent from the index, or a file that should exist does not
    #[error("Not found: {0}")]
    NotFound(String),

    /// The index can be neither loaded locally nor refreshed remotely
    #[error("Package index unavailable: {0}")]
    IndexUnavailable(String),

    /// Search pattern is not a valid regular expression
    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Package archive could not be read
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client initialization error
    #[error("Initialization error: {0}")]
    InitError(String),
}

/// Result type alias using apkget's Error type
pub type Result<T> = std::result::Result<T, Error>;
