//! Error types for store adapters, image processing and controller mutations.

use thiserror::Error;

/// Errors from record and blob store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the request.
    #[error("store transport error: {0}")]
    Transport(String),

    /// The addressed document or blob does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// A stored document could not be turned into a typed record (or back).
    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// IO error from a file-backed adapter.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from photo processing.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("could not read image: {0}")]
    Decode(String),

    #[error("could not encode image: {0}")]
    Encode(String),

    /// Still above the byte ceiling at the lowest quality and size tried.
    #[error("image is {size} bytes after compression (limit {limit})")]
    TooLarge { size: usize, limit: u64 },

    #[error("image worker failed: {0}")]
    Worker(String),
}

impl From<::image::ImageError> for ImageError {
    fn from(err: ::image::ImageError) -> Self {
        match err {
            ::image::ImageError::Encoding(e) => ImageError::Encode(e.to_string()),
            other => ImageError::Decode(other.to_string()),
        }
    }
}

/// Errors surfaced to callers of controller mutations.
///
/// Read failures never appear here; they are logged and treated as empty.
#[derive(Debug, Error)]
pub enum GarageError {
    /// A create or delete against the record store failed.
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),

    /// Photo compression or upload failed; nothing was written.
    #[error("could not process the image, please try again")]
    ImageProcessing {
        #[source]
        source: PhotoFailure,
    },
}

/// The step of the photo pipeline that failed.
#[derive(Debug, Error)]
pub enum PhotoFailure {
    #[error(transparent)]
    Compress(#[from] ImageError),

    #[error("upload failed: {0}")]
    Upload(StoreError),
}

impl GarageError {
    pub(crate) fn photo(source: impl Into<PhotoFailure>) -> Self {
        GarageError::ImageProcessing {
            source: source.into(),
        }
    }
}
