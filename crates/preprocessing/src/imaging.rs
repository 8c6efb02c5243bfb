//! Image decoding and tensor normalization

use crate::PreprocessError;
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;
use tracing::debug;

/// Spatial size the image classifier expects (square)
pub const IMAGE_SIZE: u32 = 128;

/// RGB channel count
pub const IMAGE_CHANNELS: usize = 3;

/// Normalized image batch in NHWC layout with a batch size of one
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    /// Tensor shape as `[batch, height, width, channels]`
    pub fn shape() -> [usize; 4] {
        [1, IMAGE_SIZE as usize, IMAGE_SIZE as usize, IMAGE_CHANNELS]
    }

    /// All-black input, used to check a model's output shape at load
    pub fn zeros() -> Self {
        Self(Array4::zeros(Self::shape()))
    }

    /// Borrow the underlying array
    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }

    /// Values in row-major (NHWC) order
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }
}

/// Decode uploaded bytes and produce the classifier input tensor.
///
/// Any format the `image` crate can sniff is accepted; alpha, palette and
/// grayscale inputs are converted to RGB first.
pub fn preprocess_image(bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PreprocessError::ImageDecode(e.to_string()))?;
    debug!(
        "Decoded {}x{} image ({:?})",
        decoded.width(),
        decoded.height(),
        decoded.color()
    );
    tensor_from_rgb(&decoded.to_rgb8())
}

/// Resize an RGB image to 128x128 and scale pixels into [0, 1]
pub fn tensor_from_rgb(rgb: &RgbImage) -> Result<ImageTensor, PreprocessError> {
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    let resized = if (width, height) == (IMAGE_SIZE, IMAGE_SIZE) {
        rgb.clone()
    } else {
        image::imageops::resize(rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom)
    };

    let mut input = Array4::<f32>::zeros(ImageTensor::shape());
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..IMAGE_CHANNELS {
            input[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }

    Ok(ImageTensor(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbaImage};
    use std::io::Cursor;

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_resizes_to_model_shape() {
        let img = RgbImage::from_pixel(300, 200, Rgb([255, 0, 128]));
        let tensor = preprocess_image(&encode_png(DynamicImage::ImageRgb8(img))).unwrap();

        assert_eq!(tensor.as_array().shape(), &[1, 128, 128, 3]);
        let px = tensor.as_array();
        assert!((px[[0, 64, 64, 0]] - 1.0).abs() < 1e-6);
        assert!(px[[0, 64, 64, 1]].abs() < 1e-6);
        assert!((px[[0, 64, 64, 2]] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_values_in_unit_range() {
        let img = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 255]));
        let tensor = preprocess_image(&encode_png(DynamicImage::ImageRgb8(img))).unwrap();

        assert!(tensor.to_vec().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(tensor.to_vec().len(), 128 * 128 * 3);
    }

    #[test]
    fn test_rgba_is_converted() {
        let img = RgbaImage::from_pixel(10, 10, image::Rgba([10, 20, 30, 0]));
        let tensor = preprocess_image(&encode_png(DynamicImage::ImageRgba8(img))).unwrap();

        assert!((tensor.as_array()[[0, 0, 0, 0]] - 10.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        let err = preprocess_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PreprocessError::ImageDecode(_)));
    }

    #[test]
    fn test_empty_image_rejected() {
        let err = tensor_from_rgb(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, PreprocessError::EmptyImage { .. }));
    }

    #[test]
    fn test_deterministic() {
        let img = RgbImage::from_fn(50, 70, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]));
        let bytes = encode_png(DynamicImage::ImageRgb8(img));

        assert_eq!(preprocess_image(&bytes).unwrap(), preprocess_image(&bytes).unwrap());
    }
}
