//! Error types for hydra-fallback.
//!
//! Two families live here. [`FallbackError`] covers failures of the crate's
//! own plumbing (config loading, CLI arguments, HTTP health checks). Provider call
//! failures are a separate vocabulary: they are classified into an
//! [`ErrorCategory`] and folded into the retry machinery, never raised.

pub mod category;
pub mod classifier;
pub mod structured;

pub use category::{CategoryPolicy, ErrorCategory, FallbackType};
pub use classifier::{classify, ClassifiedError, ErrorClassifier};
pub use structured::{
    ErrorLogger, MemoryErrorLogger, NoopErrorLogger, StructuredError, TracingErrorLogger,
};

use thiserror::Error;

/// Primary error type for crate-level operations.
#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid signal pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl FallbackError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, FallbackError>;
