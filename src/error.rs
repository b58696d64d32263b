//! Error types for canvas, dataset store and segmentation operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::layer::LayerRole;

/// Errors raised by the dataset store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster could not be decoded or encoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON parsing error (class definitions)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The image directory holds no samples
    #[error("No images found in {dir:?}")]
    NoImages {
        /// Directory that was enumerated
        dir: PathBuf,
    },

    /// Class definitions are malformed
    #[error("Invalid class palette: {message}")]
    InvalidPalette {
        /// Description of the problem
        message: String,
    },
}

impl StoreError {
    /// Create an invalid palette error with a message.
    pub fn invalid_palette(message: impl Into<String>) -> Self {
        Self::InvalidPalette {
            message: message.into(),
        }
    }
}

/// Errors raised by the external segmentation model.
#[derive(Error, Debug)]
pub enum SegmentError {
    /// No model has been configured
    #[error("Segmentation model is not set")]
    ModelUnavailable,

    /// The model ran but failed to produce a label raster
    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    /// The model process could not be started
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading, editing or persisting the canvas.
#[derive(Error, Debug)]
pub enum CanvasError {
    /// Raster exists but could not be read
    #[error("Failed to load {path:?}: {source}")]
    Load {
        /// Raster that failed to load
        path: PathBuf,
        /// Underlying decode error
        #[source]
        source: image::ImageError,
    },

    /// The image of a sample is missing, so the sample cannot be shown
    #[error("Image not found: {path:?}")]
    ImageMissing {
        /// Path where the image was expected
        path: PathBuf,
    },

    /// A layer raster does not match the image dimensions
    #[error("{role} raster is {found:?} but the image is {expected:?}")]
    DimensionMismatch {
        /// Layer the raster was meant for
        role: LayerRole,
        /// Image dimensions
        expected: (u32, u32),
        /// Raster dimensions
        found: (u32, u32),
    },

    /// An operation needed a current sample but none is loaded
    #[error("No sample is loaded")]
    NoSample,

    /// Dataset store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Segmentation model failure
    #[error(transparent)]
    Segment(#[from] SegmentError),
}

impl CanvasError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(role: LayerRole, expected: (u32, u32), found: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            role,
            expected,
            found,
        }
    }
}
