use core::result::Result as CoreResult;
use std::io::Error as IoError;

use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A batch operation failed partway through.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error came from an operation body rather than
    /// the surrounding infrastructure.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Self::Operation(_))
    }
}
