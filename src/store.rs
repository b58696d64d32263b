//! Dataset store boundary.
//!
//! The core never touches dataset paths directly; it asks a [`DatasetStore`]
//! for the image list, the per-sample raster paths, raster I/O, the class
//! palette and the accepted corpus. [`FsDatasetStore`] is the directory-based
//! implementation:
//!
//! ```text
//! <top>/classes.json
//! <top>/<workset>/images/*
//! <top>/<workset>/labels/<stem>.png
//! <top>/<workset>/sam/<stem>.png
//! <top>/<workset>/roi/<stem>.png
//! <top>/<accepted>/images/<md5><.ext>
//! <top>/<accepted>/labels/<md5>.png
//! <top>/undo_history/
//! ```

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat};
use md5::{Digest, Md5};

use crate::config::WorkspaceConfig;
use crate::constants::{CLASSES_FILE, MASK_EXTENSION, UNDO_HISTORY_DIR};
use crate::error::StoreError;
use crate::palette::ClassPalette;
use crate::raster;

/// Every raster path belonging to one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePaths {
    /// Source photograph
    pub image: PathBuf,
    /// Saved label mask
    pub label: PathBuf,
    /// Segmentation model output
    pub model_assist: PathBuf,
    /// Region-of-interest mask
    pub roi: PathBuf,
}

/// Result of accepting a sample into the accepted corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSample {
    /// Hex content hash naming both files
    pub hash: String,
    /// Copied image
    pub image: PathBuf,
    /// Written label
    pub label: PathBuf,
}

/// Storage the annotation core reads samples from and writes labels to.
pub trait DatasetStore {
    /// Sample images, oldest modification time first.
    fn list_images(&self) -> Result<Vec<PathBuf>, StoreError>;

    /// Resolve the label and overlay paths of a sample image.
    fn sample_paths(&self, image: &Path) -> SamplePaths;

    /// Read a raster, `Ok(None)` when it does not exist.
    fn read_raster(&self, path: &Path) -> Result<Option<DynamicImage>, StoreError>;

    /// Write a class-id mask.
    fn write_raster(&self, mask: &GrayImage, path: &Path) -> Result<(), StoreError>;

    /// Class id -> color mapping in declared order.
    fn class_palette(&self) -> Result<ClassPalette, StoreError>;

    /// Copy an image and its label into the accepted corpus, content-addressed.
    fn accept(&self, image: &Path, label: &GrayImage) -> Result<AcceptedSample, StoreError>;

    /// Directory holding undo snapshots.
    fn undo_dir(&self) -> PathBuf;
}

/// Lowercase hex MD5 of some bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// Whether the `image` crate recognises the file extension.
pub fn is_supported_image(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

/// Directory-backed dataset store.
#[derive(Debug, Clone)]
pub struct FsDatasetStore {
    top_dir: PathBuf,
    image_dir: PathBuf,
    label_dir: PathBuf,
    model_assist_dir: PathBuf,
    roi_dir: PathBuf,
    accepted_image_dir: PathBuf,
    accepted_label_dir: PathBuf,
}

impl FsDatasetStore {
    /// Lay out a store under `top_dir`.
    pub fn new(top_dir: impl Into<PathBuf>, workset: &str, accepted: &str) -> Self {
        let top_dir = top_dir.into();
        let work_dir = top_dir.join(workset);
        let accepted_dir = top_dir.join(accepted);
        Self {
            image_dir: work_dir.join("images"),
            label_dir: work_dir.join("labels"),
            model_assist_dir: work_dir.join("sam"),
            roi_dir: work_dir.join("roi"),
            accepted_image_dir: accepted_dir.join("images"),
            accepted_label_dir: accepted_dir.join("labels"),
            top_dir,
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(&config.top_work_dir, &config.workset, &config.accepted)
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn label_dir(&self) -> &Path {
        &self.label_dir
    }

    pub fn accepted_image_dir(&self) -> &Path {
        &self.accepted_image_dir
    }

    pub fn accepted_label_dir(&self) -> &Path {
        &self.accepted_label_dir
    }

    fn mask_name(image: &Path) -> PathBuf {
        let stem = image.file_stem().unwrap_or_default();
        PathBuf::from(stem).with_extension(MASK_EXTENSION)
    }
}

impl DatasetStore for FsDatasetStore {
    fn list_images(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut images = Vec::new();
        for entry in std::fs::read_dir(&self.image_dir)? {
            let entry = entry?;
            let path = entry.path();
            let metadata = entry.metadata()?;
            if !metadata.is_file() || !is_supported_image(&path) {
                continue;
            }
            images.push((metadata.modified()?, path));
        }

        if images.is_empty() {
            return Err(StoreError::NoImages {
                dir: self.image_dir.clone(),
            });
        }

        // file name breaks modification time ties so the order is stable
        images.sort();
        log::debug!("Found {} images in {:?}", images.len(), self.image_dir);
        Ok(images.into_iter().map(|(_, path)| path).collect())
    }

    fn sample_paths(&self, image: &Path) -> SamplePaths {
        let name = Self::mask_name(image);
        SamplePaths {
            image: image.to_path_buf(),
            label: self.label_dir.join(&name),
            model_assist: self.model_assist_dir.join(&name),
            roi: self.roi_dir.join(&name),
        }
    }

    fn read_raster(&self, path: &Path) -> Result<Option<DynamicImage>, StoreError> {
        Ok(raster::read(path)?)
    }

    fn write_raster(&self, mask: &GrayImage, path: &Path) -> Result<(), StoreError> {
        Ok(raster::write_mask(mask, path)?)
    }

    fn class_palette(&self) -> Result<ClassPalette, StoreError> {
        let path = self.top_dir.join(CLASSES_FILE);
        let json = std::fs::read_to_string(&path)?;
        let palette = ClassPalette::from_json(&json)?;
        log::info!("Loaded {} classes from {:?}", palette.len(), path);
        Ok(palette)
    }

    fn accept(&self, image: &Path, label: &GrayImage) -> Result<AcceptedSample, StoreError> {
        let bytes = std::fs::read(image)?;
        let hash = content_hash(&bytes);

        let extension = image
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        std::fs::create_dir_all(&self.accepted_image_dir)?;
        let image_target = self.accepted_image_dir.join(format!("{hash}{extension}"));
        std::fs::copy(image, &image_target)?;

        let label_target = self
            .accepted_label_dir
            .join(format!("{hash}.{MASK_EXTENSION}"));
        self.write_raster(label, &label_target)?;

        log::info!("Accepted {:?} as {}", image, hash);
        Ok(AcceptedSample {
            hash,
            image: image_target,
            label: label_target,
        })
    }

    fn undo_dir(&self) -> PathBuf {
        self.top_dir.join(UNDO_HISTORY_DIR)
    }
}
