use image::RgbImage;

use crate::error::ResolveError;

/// Upload name suffixes accepted by the image entry point.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Turns a face image into the embedding the gallery was built from.
///
/// Implementations report a picture without a usable face as
/// [`ResolveError::NoFaceDetected`].
pub trait EmbeddingExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Vec<f32>, ResolveError>;
}

pub fn check_file_name(file_name: &str) -> Result<(), ResolveError> {
    if SUPPORTED_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext)) {
        Ok(())
    } else {
        Err(ResolveError::UnsupportedFileType)
    }
}

/// Decode an upload and convert it to 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ResolveError> {
    let img =
        image::load_from_memory(bytes).map_err(|e| ResolveError::InvalidImage(e.to_string()))?;
    Ok(img.to_rgb8())
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxExtractor;

#[cfg(feature = "onnx")]
mod onnx {
    use anyhow::{Context, Result};
    use image::RgbImage;
    use ndarray::Array4;
    use ort::{
        session::{builder::GraphOptimizationLevel, Session},
        value::Value,
    };
    use std::path::Path;

    use super::EmbeddingExtractor;
    use crate::error::ResolveError;

    /// FaceNet input edge length.
    const INPUT_SIZE: u32 = 160;

    /// Runs a FaceNet-512 ONNX export over an image that is already cropped
    /// to the face. Input is NHWC RGB scaled to [-1, 1].
    pub struct OnnxExtractor {
        session: Session,
    }

    impl OnnxExtractor {
        pub fn from_file(path: &Path) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(path)
                .with_context(|| format!("load embedding model {}", path.display()))?;
            Ok(Self { session })
        }
    }

    fn model_err(e: impl std::fmt::Display) -> ResolveError {
        ResolveError::Extractor(e.to_string())
    }

    impl EmbeddingExtractor for OnnxExtractor {
        fn extract(&mut self, image: &RgbImage) -> Result<Vec<f32>, ResolveError> {
            let size = INPUT_SIZE as usize;
            let face = image::imageops::resize(
                image,
                INPUT_SIZE,
                INPUT_SIZE,
                image::imageops::FilterType::Triangle,
            );

            let input_data: Vec<f32> = face
                .as_raw()
                .iter()
                .map(|&p| p as f32 / 127.5 - 1.0)
                .collect();
            let input_array =
                Array4::from_shape_vec((1, size, size, 3), input_data).map_err(model_err)?;
            let input_tensor = Value::from_array(input_array).map_err(model_err)?;

            let outputs = self
                .session
                .run(ort::inputs![input_tensor])
                .map_err(model_err)?;
            let (_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(model_err)?;

            Ok(data.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    #[test]
    fn test_check_file_name() {
        for ok in ["a.jpg", "a.jpeg", "b.png", "c.webp", "dir/x.y.png"] {
            assert!(check_file_name(ok).is_ok(), "{ok}");
        }
        for bad in ["a.gif", "a.JPG", "png", "a.png.txt"] {
            assert!(matches!(
                check_file_name(bad),
                Err(ResolveError::UnsupportedFileType)
            ));
        }
    }

    #[test]
    fn test_decode_png() {
        let img = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();

        let decoded = decode_image(buf.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_converts_grayscale() {
        let img = image::GrayImage::from_pixel(2, 2, image::Luma([200]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();

        let decoded = decode_image(buf.get_ref()).unwrap();
        assert_eq!(decoded.get_pixel(1, 1), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(ResolveError::InvalidImage(_))
        ));
    }
}
