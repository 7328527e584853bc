//! Image to tensor conversion for model inference

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Lower bound for the max-pixel divisor, keeps all-black images finite
const MIN_PIXEL_SCALE: f32 = 1e-6;

/// Image preprocessing for segmentation models
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess image for model inference
    ///
    /// - RGB conversion
    /// - Square resize to the model input size (aspect ratio is not kept)
    /// - Scaling by the brightest channel value of the resized image
    /// - Mean/std normalization into an NCHW tensor
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let target_size = preprocessing_config.target_size;
        if target_size == 0 {
            return Err(BgRemovalError::processing("Model input size must be positive"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::processing(format!(
                "Cannot preprocess empty image ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let rgb_image = image.to_rgb8();
        let resized = image::imageops::resize(
            &rgb_image,
            target_size,
            target_size,
            FilterType::Lanczos3,
        );

        let target_size_usize = usize::try_from(target_size).map_err(|_| {
            BgRemovalError::processing("Target size too large for tensor allocation")
        })?;

        Ok(Self::image_to_tensor(
            &resized,
            preprocessing_config,
            target_size_usize,
        ))
    }

    /// Convert a resized RGB image to a normalized tensor
    fn image_to_tensor(
        image: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
        target_size: usize,
    ) -> Array4<f32> {
        let max_value = image
            .pixels()
            .flat_map(|pixel| pixel.0)
            .max()
            .map_or(0.0, f32::from)
            .max(MIN_PIXEL_SCALE);

        let mut tensor = Array4::<f32>::zeros((1, 3, target_size, target_size));

        for (y, row) in image.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                let channels = pixel
                    .0
                    .iter()
                    .zip(preprocessing_config.mean)
                    .zip(preprocessing_config.std)
                    .enumerate();
                for (channel, ((&value, mean), std)) in channels {
                    if let Some(slot) = tensor.get_mut([0, channel, y, x]) {
                        *slot = (f32::from(value) / max_value - mean) / std;
                    }
                }
            }
        }

        tensor
    }
}
