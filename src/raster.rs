//! Raster file I/O over the `image` crate.
//!
//! Masks are always written as 8-bit grayscale PNG so class ids survive
//! unchanged.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat};

/// Read a raster, returning `Ok(None)` when the file does not exist.
pub fn read(path: &Path) -> Result<Option<DynamicImage>, image::ImageError> {
    if !path.is_file() {
        log::trace!("No raster at {:?}", path);
        return Ok(None);
    }
    let raster = image::open(path)?;
    log::trace!(
        "Read {}x{} raster from {:?}",
        raster.width(),
        raster.height(),
        path
    );
    Ok(Some(raster))
}

/// Write a class-id mask as PNG, creating the parent directory if needed.
pub fn write_mask(mask: &GrayImage, path: &Path) -> Result<(), image::ImageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(image::ImageError::IoError)?;
    }
    mask.save_with_format(path, ImageFormat::Png)?;
    log::trace!("Wrote mask to {:?}", path);
    Ok(())
}

/// Read a class-id mask, keeping 8-bit values as they are.
pub fn read_mask(path: &Path) -> Result<Option<GrayImage>, image::ImageError> {
    Ok(read(path)?.map(|raster| raster.into_luma8()))
}
