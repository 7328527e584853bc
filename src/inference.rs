//! Inference backend abstraction and factory

use crate::{
    config::{BackendType, RemovalConfig},
    error::{BgRemovalError, Result},
};
use ndarray::Array4;
use std::path::PathBuf;
use std::time::Duration;

/// Trait for inference backends
pub trait InferenceBackend {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Invalid model or session configuration
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor is not 4-dimensional
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

impl<T: InferenceBackend + ?Sized> InferenceBackend for Box<T> {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        (**self).initialize(config)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        (**self).infer(input)
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }
}

/// Create an uninitialized backend of the configured type for the given model file
pub fn create_backend(
    config: &RemovalConfig,
    model_path: PathBuf,
) -> Result<Box<dyn InferenceBackend>> {
    match config.backend {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new(
            model_path,
            config.model,
        ))),
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new(
            model_path,
            config.model,
        ))),
        #[allow(unreachable_patterns)]
        other => {
            let _ = model_path;
            Err(BgRemovalError::invalid_config(format!(
                "Backend '{other}' is not compiled into this build"
            )))
        },
    }
}
