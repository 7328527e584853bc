//! Configuration types for background removal operations
//!
//! The command line only carries the two file paths, so everything tunable is
//! read from the environment by [`RemovalConfig::from_env`].

use crate::error::{BgRemovalError, Result};
use crate::models::ModelKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Model name (`u2net`, `u2netp`, `u2net_human_seg`, `silueta`, `isnet-general-use`)
pub const ENV_MODEL: &str = "REMBG_MODEL";
/// Inference backend (`onnx`, `tract`)
pub const ENV_BACKEND: &str = "REMBG_BACKEND";
/// ONNX Runtime execution provider (`auto`, `cpu`, `cuda`, `coreml`)
pub const ENV_PROVIDER: &str = "REMBG_PROVIDER";
/// Intra-op thread count, 0 = auto
pub const ENV_THREADS: &str = "REMBG_THREADS";
/// Explicit ONNX file, bypasses the cache and download
pub const ENV_MODEL_PATH: &str = "REMBG_MODEL_PATH";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "coreml" | "core-ml" => Ok(Self::CoreMl),
            _ => Err(BgRemovalError::config_value_error(
                "execution provider",
                s,
                "auto, cpu, cuda, coreml",
            )),
        }
    }
}

/// Inference engine used to run the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime
    #[default]
    Onnx,
    /// Tract (pure Rust)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl FromStr for BackendType {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" | "ort" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            _ => Err(BgRemovalError::config_value_error("backend", s, "onnx, tract")),
        }
    }
}

/// Configuration for background removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Segmentation model
    pub model: ModelKind,

    /// Inference engine
    pub backend: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Explicit model file; when unset the model comes from the cache
    pub model_path: Option<PathBuf>,

    /// Emit the segmentation mask instead of the cut-out
    pub only_mask: bool,

    /// Composite the cut-out over this RGBA colour instead of transparency
    pub background_color: Option<[u8; 4]>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            backend: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            model_path: None,
            only_mask: false,
            background_color: None,
        }
    }
}

impl RemovalConfig {
    /// Create a builder for `RemovalConfig`
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Resolve configuration from the process environment
    ///
    /// Unset variables keep their defaults; set but unparsable values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(model) = non_empty(ENV_MODEL) {
            builder = builder.model(model.parse()?);
        }
        if let Some(backend) = non_empty(ENV_BACKEND) {
            builder = builder.backend(backend.parse()?);
        }
        if let Some(provider) = non_empty(ENV_PROVIDER) {
            builder = builder.execution_provider(provider.parse()?);
        }
        if let Some(threads) = non_empty(ENV_THREADS) {
            let threads = threads.trim().parse::<usize>().map_err(|_| {
                BgRemovalError::config_value_error(ENV_THREADS, &threads, "a non-negative integer")
            })?;
            builder = builder.num_threads(threads);
        }
        if let Some(path) = non_empty(ENV_MODEL_PATH) {
            builder = builder.model_path(PathBuf::from(path));
        }
        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.model_path {
            if path.as_os_str().is_empty() {
                return Err(BgRemovalError::invalid_config("Model path must not be empty"));
            }
        }

        if self.only_mask && self.background_color.is_some() {
            return Err(BgRemovalError::invalid_config(
                "only_mask and background_color are mutually exclusive",
            ));
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set the segmentation model
    #[must_use]
    pub fn model(mut self, model: ModelKind) -> Self {
        self.config.model = model;
        self
    }

    /// Set the inference backend
    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set intra-op threads to `threads` and inter-op threads to half of it (minimum 1)
    ///
    /// `0` leaves both on auto-detection.
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        if threads == 0 {
            self.config.intra_threads = 0;
            self.config.inter_threads = 0;
        } else {
            self.config.intra_threads = threads;
            self.config.inter_threads = (threads / 2).max(1);
        }
        self
    }

    /// Load the model from an explicit file
    #[must_use]
    pub fn model_path(mut self, path: PathBuf) -> Self {
        self.config.model_path = Some(path);
        self
    }

    #[must_use]
    pub fn only_mask(mut self, only_mask: bool) -> Self {
        self.config.only_mask = only_mask;
        self
    }

    #[must_use]
    pub fn background_color(mut self, color: [u8; 4]) -> Self {
        self.config.background_color = Some(color);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
