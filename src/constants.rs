//! Global constants for the maskpaint annotation core

/// Smallest brush diameter in pixels
pub const MIN_BRUSH_SIZE: u32 = 1;

/// Largest brush diameter in pixels
pub const MAX_BRUSH_SIZE: u32 = 150;

/// Brush diameter used when nothing else is configured
pub const DEFAULT_BRUSH_SIZE: u32 = 50;

/// Default label layer opacity (percent)
pub const DEFAULT_LABEL_OPACITY: u8 = 50;

/// Default model-assist overlay opacity (percent)
pub const DEFAULT_MODEL_ASSIST_OPACITY: u8 = 50;

/// Default region-of-interest overlay opacity (percent)
pub const DEFAULT_ROI_OPACITY: u8 = 20;

/// Highest opacity value a layer accepts
pub const MAX_OPACITY: u8 = 100;

/// Class id written by the eraser and meaning "unlabeled"
pub const UNLABELED: u8 = 0;

/// Extension for every mask raster written by the core (labels, overlays, snapshots)
pub const MASK_EXTENSION: &str = "png";

/// File name prefix of undo snapshots (`undo_<index>.png`)
pub const UNDO_FILE_PREFIX: &str = "undo_";

/// Name of the class definition file at the top of the work directory
pub const CLASSES_FILE: &str = "classes.json";

/// Name of the undo history directory at the top of the work directory
pub const UNDO_HISTORY_DIR: &str = "undo_history";
