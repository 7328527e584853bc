//! Background removal capability
//!
//! [`BackgroundRemover`] is the single operation the command line depends on:
//! encoded image bytes in, encoded PNG bytes with the background made
//! transparent out. [`ModelRemover`] implements it on top of an
//! [`InferenceBackend`].

use crate::{
    codec::{ImageCodec, PngCodec},
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::{create_backend, InferenceBackend},
    models::PreprocessingConfig,
    utils::{ImagePreprocessor, MaskPostprocessor},
};
use image::DynamicImage;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, instrument};

/// Remove the background from an encoded image
pub trait BackgroundRemover {
    /// Return PNG bytes of `input` with its background made transparent
    fn remove(&mut self, input: &[u8]) -> Result<Vec<u8>>;
}

impl<T: BackgroundRemover + ?Sized> BackgroundRemover for Box<T> {
    fn remove(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        (**self).remove(input)
    }
}

/// Segmentation-model remover
///
/// The backend is initialized on the first call to [`BackgroundRemover::remove`].
pub struct ModelRemover<B: InferenceBackend> {
    backend: B,
    config: RemovalConfig,
    preprocessing: PreprocessingConfig,
    codec: PngCodec,
}

impl ModelRemover<Box<dyn InferenceBackend>> {
    /// Build a remover with the configured backend for the given model file
    pub fn from_config(config: RemovalConfig, model_path: PathBuf) -> Result<Self> {
        let backend = create_backend(&config, model_path)?;
        Ok(Self::with_backend(backend, config))
    }
}

impl<B: InferenceBackend> ModelRemover<B> {
    /// Build a remover around an existing backend
    pub fn with_backend(backend: B, config: RemovalConfig) -> Self {
        let preprocessing = config.model.preprocessing();
        Self {
            backend,
            config,
            preprocessing,
            codec: PngCodec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Remove the background from an already decoded image
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn remove_image(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        if let Some(load_time) = self.backend.initialize(&self.config)? {
            debug!(
                load_ms = load_time.as_secs_f64() * 1000.0,
                model = %self.config.model,
                "model loaded"
            );
        }

        let start = Instant::now();
        let tensor = ImagePreprocessor::preprocess_image(image, &self.preprocessing)?;
        let prediction = self.backend.infer(&tensor)?;
        let mask =
            MaskPostprocessor::mask_from_prediction(&prediction, image.width(), image.height())?;

        let output = if self.config.only_mask {
            MaskPostprocessor::mask_to_rgba(&mask)
        } else {
            let cutout = MaskPostprocessor::cutout(image, &mask)?;
            match self.config.background_color {
                Some(color) => MaskPostprocessor::composite_over(&cutout, color),
                None => cutout,
            }
        };

        debug!(
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "background removed"
        );
        Ok(DynamicImage::ImageRgba8(output))
    }
}

impl<B: InferenceBackend> BackgroundRemover for ModelRemover<B> {
    fn remove(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if input.is_empty() {
            return Err(BgRemovalError::processing("Input image is empty"));
        }
        let image = self.codec.decode(input)?;
        let output = self.remove_image(&image)?;
        self.codec.encode_png(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;
    use image::{ColorType, ImageFormat, Rgb, RgbImage};
    use ndarray::Array4;
    use std::time::Duration;

    /// Backend predicting foreground on the right half of its input
    struct HalfPlaneBackend {
        initialized: bool,
        calls: usize,
    }

    impl HalfPlaneBackend {
        fn new() -> Self {
            Self {
                initialized: false,
                calls: 0,
            }
        }
    }

    impl InferenceBackend for HalfPlaneBackend {
        fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
            if self.initialized {
                return Ok(None);
            }
            self.initialized = true;
            Ok(Some(Duration::from_millis(1)))
        }

        fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
            self.calls += 1;
            let (_, _, h, w) = input.dim();
            Ok(Array4::from_shape_fn((1, 1, h, w), |(_, _, _, x)| {
                if x >= w / 2 {
                    1.0
                } else {
                    0.0
                }
            }))
        }

        fn is_initialized(&self) -> bool {
            self.initialized
        }
    }

    fn encoded_rgb(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 80, 120])));
        let mut buffer = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn remover(config: RemovalConfig) -> ModelRemover<HalfPlaneBackend> {
        ModelRemover::with_backend(HalfPlaneBackend::new(), config)
    }

    #[test]
    fn test_remove_produces_png_with_alpha() {
        let mut remover = remover(RemovalConfig::default());
        let output = remover.remove(&encoded_rgb(64, 32)).unwrap();

        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgba8);
        assert_eq!((decoded.width(), decoded.height()), (64, 32));

        let rgba = decoded.to_rgba8();
        assert_eq!(rgba.get_pixel(2, 16).0, [40, 80, 120, 0]);
        assert_eq!(rgba.get_pixel(61, 16).0, [40, 80, 120, 255]);
    }

    #[test]
    fn test_backend_initialized_once() {
        let mut remover = remover(RemovalConfig::default());
        let input = encoded_rgb(8, 8);
        remover.remove(&input).unwrap();
        remover.remove(&input).unwrap();
        assert!(remover.backend.is_initialized());
        assert_eq!(remover.backend.calls, 2);
    }

    #[test]
    fn test_only_mask_output() {
        let config = RemovalConfig::builder().only_mask(true).build().unwrap();
        let mut remover = remover(config);
        let output = remover.remove(&encoded_rgb(40, 10)).unwrap();
        let rgba = image::load_from_memory(&output).unwrap().to_rgba8();
        assert_eq!(rgba.get_pixel(1, 5).0, [0, 0, 0, 255]);
        assert_eq!(rgba.get_pixel(38, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_background_color_fills_removed_area() {
        let config = RemovalConfig::builder()
            .background_color([255, 255, 255, 255])
            .build()
            .unwrap();
        let mut remover = remover(config);
        let output = remover.remove(&encoded_rgb(40, 10)).unwrap();
        let rgba = image::load_from_memory(&output).unwrap().to_rgba8();
        assert_eq!(rgba.get_pixel(1, 5).0, [255, 255, 255, 255]);
        assert_eq!(rgba.get_pixel(38, 5).0, [40, 80, 120, 255]);
    }

    #[test]
    fn test_invalid_input_is_an_error() {
        let mut remover = remover(RemovalConfig::default());
        assert!(matches!(
            remover.remove(b"GIF89a-but-not-really"),
            Err(BgRemovalError::Image(_))
        ));
        assert!(matches!(remover.remove(&[]), Err(BgRemovalError::Processing(_))));
        assert_eq!(remover.backend.calls, 0);
    }

    #[test]
    fn test_boxed_remover_dispatch() {
        let mut boxed: Box<dyn BackgroundRemover> = Box::new(remover(RemovalConfig::default()));
        assert!(boxed.remove(&encoded_rgb(4, 4)).is_ok());
    }

    #[test]
    fn test_preprocessing_follows_model() {
        let config = RemovalConfig::builder()
            .model(ModelKind::IsnetGeneralUse)
            .build()
            .unwrap();
        let remover = remover(config);
        assert_eq!(remover.preprocessing.target_size, 1024);
        assert_eq!(remover.config().model, ModelKind::IsnetGeneralUse);
    }
}
