//! ONNX Runtime backend implementation for segmentation models
//!
//! Runs the model with ONNX Runtime, with support for multiple execution
//! providers (CPU, CUDA, CoreML). Unavailable accelerators fall back to CPU.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelKind;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    model_path: PathBuf,
    model: ModelKind,
    session: Option<Session>,
}

impl OnnxBackend {
    /// Create a new uninitialized backend for the given model file
    #[must_use]
    pub fn new(model_path: PathBuf, model: ModelKind) -> Self {
        Self {
            model_path,
            model,
            session: None,
        }
    }

    /// Resolve the requested provider into the list registered on the session
    fn resolve_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => {
                log::debug!("Using CPU execution provider");
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }
        providers
    }

    /// Thread counts, with 0 replaced by values derived from the core count
    fn thread_counts(config: &RemovalConfig) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4);

        let intra = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }

    /// Load and initialize the ONNX model
    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let model_data = std::fs::read(&self.model_path).map_err(|e| {
            BgRemovalError::file_io_error("read model file", &self.model_path, &e)
        })?;

        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::resolve_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let (intra_threads, inter_threads) = Self::thread_counts(config);

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgRemovalError::model(format!(
                    "Failed to create session from '{}': {e}",
                    self.model_path.display()
                ))
            })?;

        log::debug!(
            "ONNX Runtime session ready: model={}, provider={}, threads={intra_threads}/{inter_threads}",
            self.model,
            config.execution_provider
        );

        self.session = Some(session);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional input, first output: model tensor names differ across the catalogue
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let output_shape = output_tensor.shape().to_vec();
        let output_data = output_tensor.view().to_owned();

        let result = match output_shape.as_slice() {
            [n, c, h, w] => Array4::from_shape_vec(
                (*n, *c, *h, *w),
                output_data.into_raw_vec_and_offset().0,
            )
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
            }),
            other => Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                other.len()
            ))),
        };

        log::debug!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        result
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}
