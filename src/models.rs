//! Catalogue of supported segmentation models
//!
//! Every model is a single ONNX file published on the rembg release page. The
//! catalogue records where to fetch it and how its input tensor must be
//! prepared.

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Base URL all model files are published under
pub const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// ImageNet normalisation used by the U2-Net family
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Supported segmentation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// General purpose U2-Net (176 MB)
    #[default]
    U2net,
    /// Lightweight U2-Net (4.7 MB)
    U2netp,
    /// U2-Net trained for human segmentation
    U2netHumanSeg,
    /// Reduced U2-Net (43 MB)
    Silueta,
    /// IS-Net general use
    IsnetGeneralUse,
}

/// Input tensor preparation for a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input edge length in pixels
    pub target_size: u32,
    /// Per-channel mean subtracted after scaling to [0, 1]
    pub mean: [f32; 3],
    /// Per-channel standard deviation divided after mean subtraction
    pub std: [f32; 3],
}

impl ModelKind {
    /// All models in catalogue order
    pub const ALL: [Self; 5] = [
        Self::U2net,
        Self::U2netp,
        Self::U2netHumanSeg,
        Self::Silueta,
        Self::IsnetGeneralUse,
    ];

    /// Canonical model name, also the stem of its ONNX file
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netp => "u2netp",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
        }
    }

    /// ONNX file name inside the model cache
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.name())
    }

    /// Download URL of the ONNX file
    #[must_use]
    pub fn url(self) -> String {
        format!("{}/{}", MODEL_RELEASE_URL, self.file_name())
    }

    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => PreprocessingConfig {
                target_size: 320,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
            },
            Self::IsnetGeneralUse => PreprocessingConfig {
                target_size: 1024,
                mean: [0.5, 0.5, 0.5],
                std: [1.0, 1.0, 1.0],
            },
        }
    }

    /// Expected input tensor shape (NCHW)
    #[must_use]
    pub fn input_shape(self) -> (usize, usize, usize, usize) {
        let size = self.preprocessing().target_size as usize;
        (1, 3, size, size)
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let normalized = normalized.strip_suffix(".onnx").unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().replace('_', "-") == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|kind| kind.name()).collect();
                BgRemovalError::config_value_error("model", s, &names.join(", "))
            })
    }
}
