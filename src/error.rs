//! Error types for background removal operations

use std::path::Path;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Tensor or pixel processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Model download errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error wrapping the underlying cause
    pub fn network_error<S, E>(msg: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message: msg.into(),
            source: Box::new(source),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with the accepted values
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_values: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: '{}' (expected: {})",
            parameter, value, valid_values
        ))
    }
}
