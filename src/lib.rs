#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # rembg-remove
//!
//! Background removal for single images using U2-Net family segmentation
//! models, with ONNX Runtime and Tract inference backends.
//!
//! ## Features
//!
//! - **Models**: `u2net`, `u2netp`, `u2net_human_seg`, `silueta`, `isnet-general-use`
//! - **Backends**: ONNX Runtime (CPU, CUDA, `CoreML`) and Tract (pure Rust)
//! - **Model cache**: automatic download into `$U2NET_HOME` or `~/.u2net`
//! - **Output**: straight-alpha RGBA PNG, optionally mask-only or composited
//! - **CLI**: `rembg-remove <input_path> <output_path>` (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rembg_remove::{
//!     remove_background_file, ModelDownloader, ModelKind, ModelRemover, PngCodec, RemovalConfig,
//! };
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder().model(ModelKind::U2netp).build()?;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let model_path = runtime.block_on(ModelDownloader::new()?.ensure_model(config.model, true))?;
//!
//! let mut remover = ModelRemover::from_config(config, model_path)?;
//! remove_background_file(
//!     Path::new("photo.jpg"),
//!     Path::new("photo.png"),
//!     &mut remover,
//!     &PngCodec::new(),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod remover;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;

use std::path::Path;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache, ModelMetadata};
pub use codec::{ImageCodec, PngCodec};
pub use config::{BackendType, ExecutionProvider, RemovalConfig, RemovalConfigBuilder};
pub use download::{verify_file_integrity, ModelDownloader};
pub use error::{BgRemovalError, Result};
pub use inference::{create_backend, InferenceBackend};
pub use models::{ModelKind, PreprocessingConfig};
pub use remover::{BackgroundRemover, ModelRemover};
pub use utils::{ImagePreprocessor, MaskPostprocessor};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};

/// Remove the background of the image at `input` and write a PNG to `output`
///
/// The remover's output is decoded again before saving so that whatever it
/// returns is validated as an image and the file on disk is always PNG.
/// Nothing is written when any step fails.
///
/// # Errors
/// - `input` cannot be read
/// - Removal fails (undecodable input, inference errors)
/// - The remover's output is not a decodable image
/// - `output` cannot be written
pub fn remove_background_file<R, C>(
    input: &Path,
    output: &Path,
    remover: &mut R,
    codec: &C,
) -> Result<()>
where
    R: BackgroundRemover + ?Sized,
    C: ImageCodec + ?Sized,
{
    let input_bytes = std::fs::read(input)
        .map_err(|e| BgRemovalError::file_io_error("read input image", input, &e))?;

    let output_bytes = remover.remove(&input_bytes)?;
    let image = codec.decode(&output_bytes)?;
    codec.save_png(&image, output)
}
