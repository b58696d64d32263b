//! maskpaint - Semantic Segmentation Mask Painter
//!
//! Paints per-pixel class labels onto a dataset of images. Each sample is a
//! layered canvas (image, model-assist overlay, region of interest, label)
//! backed by a file-based undo history, and finished labels can be accepted
//! into a content-addressed corpus.

pub mod canvas;
pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod history;
pub mod keybindings;
pub mod layer;
pub mod palette;
pub mod raster;
pub mod segment;
pub mod session;
pub mod store;
pub mod stroke;

pub use config::AppConfig;
pub use error::{CanvasError, SegmentError, StoreError};
pub use session::Session;
