//! Photo downscaling before upload.

use std::io::Cursor;
use std::path::Path;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::imageops::FilterType;
use ::image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::ImageError;

/// Size and dimension ceilings for processed photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    pub max_size_bytes: u64,
    /// Longest side, in pixels.
    pub max_dimension: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: 1024 * 1024,
            max_dimension: 1920,
        }
    }
}

/// A photo as selected by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// Read a photo from disk, keeping its file name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "photo".to_string());
        Ok(Self { file_name, bytes })
    }
}

/// Output of an [`ImageProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Downscales/compresses photos. Implementations are CPU-bound and are
/// called from a blocking worker.
pub trait ImageProcessor: Send + Sync {
    fn compress(&self, photo: PhotoUpload, limits: ImageLimits) -> Result<ProcessedImage, ImageError>;
}

/// Re-encodes oversized photos as JPEG.
///
/// Photos already within both limits pass through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCompressor;

const START_QUALITY: u8 = 90;
const MIN_QUALITY: u8 = 30;
const QUALITY_STEP: u8 = 10;
const MAX_SHRINK_ROUNDS: usize = 4;

impl JpegCompressor {
    fn encode(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
        let rgb = image.to_rgb8();
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
        Ok(buf)
    }

    /// Smallest-quality-that-fits encoding at the current size, if any.
    fn encode_within(image: &DynamicImage, limit: u64) -> Result<Result<Vec<u8>, usize>, ImageError> {
        let mut quality = START_QUALITY;
        loop {
            let bytes = Self::encode(image, quality)?;
            if bytes.len() as u64 <= limit {
                return Ok(Ok(bytes));
            }
            if quality <= MIN_QUALITY {
                return Ok(Err(bytes.len()));
            }
            quality = quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY);
        }
    }
}

fn jpeg_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "photo".to_string());
    format!("{stem}.jpg")
}

impl ImageProcessor for JpegCompressor {
    fn compress(&self, photo: PhotoUpload, limits: ImageLimits) -> Result<ProcessedImage, ImageError> {
        let reader = ImageReader::new(Cursor::new(&photo.bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        let (width, height) = reader.into_dimensions()?;

        if photo.bytes.len() as u64 <= limits.max_size_bytes
            && width.max(height) <= limits.max_dimension
        {
            return Ok(ProcessedImage {
                file_name: photo.file_name,
                bytes: photo.bytes,
            });
        }

        let mut image = ImageReader::new(Cursor::new(&photo.bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(e.to_string()))?
            .decode()?;
        if image.width().max(image.height()) > limits.max_dimension {
            image = image.resize(limits.max_dimension, limits.max_dimension, FilterType::Triangle);
        }

        let mut last_size = photo.bytes.len();
        for _ in 0..=MAX_SHRINK_ROUNDS {
            match Self::encode_within(&image, limits.max_size_bytes)? {
                Ok(bytes) => {
                    tracing::debug!(
                        "Compressed {} from {} to {} bytes ({}x{})",
                        photo.file_name,
                        photo.bytes.len(),
                        bytes.len(),
                        image.width(),
                        image.height()
                    );
                    return Ok(ProcessedImage {
                        file_name: jpeg_name(&photo.file_name),
                        bytes,
                    });
                }
                Err(size) => last_size = size,
            }
            let (w, h) = (image.width() * 3 / 4, image.height() * 3 / 4);
            if w == 0 || h == 0 {
                break;
            }
            image = image.resize_exact(w, h, FilterType::Triangle);
        }

        Err(ImageError::TooLarge {
            size: last_size,
            limit: limits.max_size_bytes,
        })
    }
}
