//! Tract backend implementation for segmentation models
//!
//! Pure Rust inference with no native runtime to install. Slower than ONNX
//! Runtime but portable to every target `tract` supports.

use crate::config::RemovalConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelKind;
use ndarray::Array4;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;

/// Runnable optimized Tract model
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model_path: PathBuf,
    model_kind: ModelKind,
    model: Option<TractModel>,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend for the given model file
    #[must_use]
    pub fn new(model_path: PathBuf, model_kind: ModelKind) -> Self {
        Self {
            model_path,
            model_kind,
            model: None,
        }
    }

    /// Load and optimize the model with its input shape pinned
    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();

        if !self.model_path.is_file() {
            return Err(BgRemovalError::model(format!(
                "Model file not found: {}",
                self.model_path.display()
            )));
        }

        let (batch, channels, height, width) = self.model_kind.input_shape();
        log::debug!(
            "Creating Tract model {} from {}",
            self.model_kind,
            self.model_path.display()
        );

        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .map_err(|e| BgRemovalError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([batch, channels, height, width]).into())
            .map_err(|e| BgRemovalError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgRemovalError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to create runnable model: {e}"))
            })?;

        self.model = Some(model);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {:.2}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Tract model not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Running Tract inference, input shape: {:?}", input.shape());

        // Copy through a flat buffer so tract's ndarray version stays decoupled from ours
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data).map_err(|e| {
            BgRemovalError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.as_slice::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to read output tensor: {e}"))
        })?;

        let output_array = match output_tensor.shape() {
            &[n, c, h, w] => Array4::from_shape_vec((n, c, h, w), output_data.to_vec())
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
                })?,
            other => {
                return Err(BgRemovalError::inference(format!(
                    "Expected 4D output tensor, got {}D",
                    other.len()
                )))
            },
        };

        log::debug!(
            "Tract inference completed in {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}
