//! Model output to mask conversion and mask application

use crate::error::{BgRemovalError, Result};
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use ndarray::{s, Array4};

/// Mask extraction and cut-out compositing
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Convert raw model output into an 8-bit mask of the original image size
    ///
    /// Uses channel 0 of the first batch entry, min-max normalised so the
    /// weakest prediction becomes 0 and the strongest 255. A constant
    /// prediction carries no foreground signal and yields an empty mask.
    pub fn mask_from_prediction(
        prediction: &Array4<f32>,
        width: u32,
        height: u32,
    ) -> Result<GrayImage> {
        let (batch, channels, pred_height, pred_width) = prediction.dim();
        if batch == 0 || channels == 0 || pred_height == 0 || pred_width == 0 {
            return Err(BgRemovalError::processing(format!(
                "Model output has an empty dimension: {:?}",
                prediction.dim()
            )));
        }

        let plane = prediction.slice(s![0, 0, .., ..]);
        let (min, max) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let mask_width = u32::try_from(pred_width)
            .map_err(|_| BgRemovalError::processing("Model output width out of range"))?;
        let mask_height = u32::try_from(pred_height)
            .map_err(|_| BgRemovalError::processing("Model output height out of range"))?;

        let raw_mask = GrayImage::from_fn(mask_width, mask_height, |x, y| {
            let value = plane
                .get((y as usize, x as usize))
                .copied()
                .unwrap_or(min);
            let normalized = if range > f32::EPSILON && range.is_finite() {
                (value - min) / range
            } else {
                0.0
            };
            // Truncate like a uint8 cast of the scaled prediction
            Luma([(normalized.clamp(0.0, 1.0) * 255.0) as u8])
        });

        if raw_mask.dimensions() == (width, height) {
            return Ok(raw_mask);
        }

        Ok(image::imageops::resize(
            &raw_mask,
            width,
            height,
            FilterType::Lanczos3,
        ))
    }

    /// Apply the mask as alpha channel; existing transparency is kept
    pub fn cutout(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
        Self::check_dimensions(image, mask)?;

        let mut rgba = image.to_rgba8();
        for (pixel, mask_pixel) in rgba.pixels_mut().zip(mask.pixels()) {
            let [r, g, b, a] = pixel.0;
            let alpha = (u16::from(a) * u16::from(mask_pixel.0[0]) + 127) / 255;
            *pixel = Rgba([r, g, b, alpha as u8]);
        }
        Ok(rgba)
    }

    /// Render the mask itself as an opaque image
    #[must_use]
    pub fn mask_to_rgba(mask: &GrayImage) -> RgbaImage {
        RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
            let value = mask.get_pixel(x, y).0[0];
            Rgba([value, value, value, 255])
        })
    }

    /// Composite a cut-out over a solid colour (Porter-Duff "over")
    #[must_use]
    pub fn composite_over(cutout: &RgbaImage, background: [u8; 4]) -> RgbaImage {
        let [bg_r, bg_g, bg_b, bg_a] = background.map(|c| f32::from(c) / 255.0);

        let mut output = cutout.clone();
        for pixel in output.pixels_mut() {
            let [r, g, b, a] = pixel.0.map(|c| f32::from(c) / 255.0);
            let out_a = a + bg_a * (1.0 - a);
            let blend = |fg: f32, bg: f32| {
                if out_a <= f32::EPSILON {
                    0
                } else {
                    let value = (fg * a + bg * bg_a * (1.0 - a)) / out_a;
                    (value * 255.0).round().clamp(0.0, 255.0) as u8
                }
            };
            *pixel = Rgba([
                blend(r, bg_r),
                blend(g, bg_g),
                blend(b, bg_b),
                (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
            ]);
        }
        output
    }

    fn check_dimensions(image: &DynamicImage, mask: &GrayImage) -> Result<()> {
        let image_dims = (image.width(), image.height());
        if image_dims == mask.dimensions() {
            Ok(())
        } else {
            Err(BgRemovalError::processing(format!(
                "Mask size {:?} does not match image size {:?}",
                mask.dimensions(),
                image_dims
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient_prediction(size: usize) -> Array4<f32> {
        Array4::from_shape_fn((1, 1, size, size), |(_, _, _, x)| x as f32 * 0.25 - 3.0)
    }

    #[test]
    fn test_mask_spans_full_range() {
        let mask = MaskPostprocessor::mask_from_prediction(&gradient_prediction(4), 4, 4).unwrap();
        assert_eq!(mask.dimensions(), (4, 4));
        assert_eq!(mask.get_pixel(0, 2).0[0], 0);
        assert_eq!(mask.get_pixel(3, 2).0[0], 255);
        assert!(mask.get_pixel(1, 0).0[0] < mask.get_pixel(2, 0).0[0]);
    }

    #[test]
    fn test_mask_is_resized_to_original() {
        let mask = MaskPostprocessor::mask_from_prediction(&gradient_prediction(8), 30, 17).unwrap();
        assert_eq!(mask.dimensions(), (30, 17));
    }

    #[test]
    fn test_constant_prediction_gives_empty_mask() {
        let prediction = Array4::from_elem((1, 1, 4, 4), 0.7);
        let mask = MaskPostprocessor::mask_from_prediction(&prediction, 4, 4).unwrap();
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_extra_output_channels_are_ignored() {
        let mut prediction = Array4::zeros((1, 2, 2, 2));
        prediction[[0, 0, 0, 0]] = 1.0;
        prediction[[0, 1, 1, 1]] = 50.0;
        let mask = MaskPostprocessor::mask_from_prediction(&prediction, 2, 2).unwrap();
        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn test_empty_prediction_is_rejected() {
        let prediction = Array4::<f32>::zeros((1, 0, 4, 4));
        assert!(MaskPostprocessor::mask_from_prediction(&prediction, 4, 4).is_err());
    }

    #[test]
    fn test_cutout_keeps_color_and_uses_mask_as_alpha() {
        let image = DynamicImage::ImageRgb8(image::ImageBuffer::from_pixel(2, 1, Rgb([10, 20, 30])));
        let mask = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let cut = MaskPostprocessor::cutout(&image, &mask).unwrap();

        assert_eq!(cut.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(cut.get_pixel(1, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_cutout_respects_existing_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 128])));
        let mask = GrayImage::from_pixel(1, 1, Luma([255]));
        let cut = MaskPostprocessor::cutout(&image, &mask).unwrap();
        assert_eq!(cut.get_pixel(0, 0).0[3], 128);
    }

    #[test]
    fn test_cutout_dimension_mismatch() {
        let image = DynamicImage::new_rgb8(3, 3);
        let mask = GrayImage::new(2, 2);
        assert!(MaskPostprocessor::cutout(&image, &mask).is_err());
    }

    #[test]
    fn test_mask_to_rgba_is_opaque() {
        let mask = GrayImage::from_raw(2, 1, vec![0, 200]).unwrap();
        let rgba = MaskPostprocessor::mask_to_rgba(&mask);
        assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn test_composite_over_solid_background() {
        let cut = RgbaImage::from_raw(2, 1, vec![255, 0, 0, 0, 255, 0, 0, 255]).unwrap();
        let composed = MaskPostprocessor::composite_over(&cut, [0, 0, 255, 255]);
        assert_eq!(composed.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(composed.get_pixel(1, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_composite_over_transparent_background_is_identity_for_opaque() {
        let cut = RgbaImage::from_pixel(1, 1, Rgba([9, 8, 7, 255]));
        let composed = MaskPostprocessor::composite_over(&cut, [0, 0, 0, 0]);
        assert_eq!(composed.get_pixel(0, 0).0, [9, 8, 7, 255]);
    }
}
