//! Shared image/tensor conversion utilities

pub mod postprocessing;
pub mod preprocessing;

pub use postprocessing::MaskPostprocessor;
pub use preprocessing::ImagePreprocessor;
